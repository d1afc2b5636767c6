//! Antiferromagnetic Heisenberg model.

use nalgebra::DVector;
use num_complex::Complex64;

use crate::graph::Graph;
use crate::hamiltonian::Operator;

/// `H = sum_<ij> [sz_i sz_j + 2 (s+_i s-_j + s-_i s+_j)]` in the `+-1`
/// representation of spin-1/2.
///
/// On bipartite graphs the exchange term carries the Marshall sign, so the
/// ground state has real positive amplitudes in the rotated basis.
pub struct Heisenberg {
    edges: Vec<(usize, usize)>,
    offdiag: f64,
}

impl Heisenberg {
    pub fn new(graph: &impl Graph) -> Self {
        let offdiag = if graph.is_bipartite() { -2.0 } else { 2.0 };
        Self { edges: graph.edges().to_vec(), offdiag }
    }
}

impl Operator for Heisenberg {
    fn find_conn(
        &self,
        v: &DVector<f64>,
        mel: &mut Vec<Complex64>,
        connectors: &mut Vec<Vec<usize>>,
        newconfs: &mut Vec<Vec<f64>>,
    ) {
        mel.clear();
        connectors.clear();
        newconfs.clear();

        let diag: f64 = self.edges.iter().map(|&(i, j)| v[i] * v[j]).sum();
        mel.push(Complex64::new(diag, 0.0));
        connectors.push(Vec::new());
        newconfs.push(Vec::new());

        // exchange acts only on antiparallel pairs
        for &(i, j) in &self.edges {
            if v[i] != v[j] {
                mel.push(Complex64::new(self.offdiag, 0.0));
                connectors.push(vec![i, j]);
                newconfs.push(vec![v[j], v[i]]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Hypercube;

    #[test]
    fn two_site_connections() {
        let g = Hypercube::new(2, 1, true).unwrap();
        let op = Heisenberg::new(&g);

        let v = DVector::from_vec(vec![1.0, -1.0]);
        let mut mel = Vec::new();
        let mut conn = Vec::new();
        let mut newconf = Vec::new();
        op.find_conn(&v, &mut mel, &mut conn, &mut newconf);

        assert_eq!(mel.len(), 2);
        assert_eq!(mel[0].re, -1.0);
        assert_eq!(mel[1].re, -2.0);
        assert_eq!(conn[1], vec![0, 1]);
        assert_eq!(newconf[1], vec![-1.0, 1.0]);
    }

    #[test]
    fn parallel_spins_are_diagonal_only() {
        let g = Hypercube::new(2, 1, true).unwrap();
        let op = Heisenberg::new(&g);

        let v = DVector::from_vec(vec![1.0, 1.0]);
        let mut mel = Vec::new();
        let mut conn = Vec::new();
        let mut newconf = Vec::new();
        op.find_conn(&v, &mut mel, &mut conn, &mut newconf);

        assert_eq!(mel.len(), 1);
        assert_eq!(mel[0].re, 1.0);
    }

    #[test]
    fn frustrated_graph_drops_marshall_sign() {
        let g = Hypercube::new(3, 1, true).unwrap();
        let op = Heisenberg::new(&g);
        assert_eq!(op.offdiag, 2.0);
    }
}
