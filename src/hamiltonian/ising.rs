//! Transverse-field Ising model.

use nalgebra::DVector;
use num_complex::Complex64;

use crate::graph::Graph;
use crate::hamiltonian::Operator;

/// `H = -sum_<ij> sz_i sz_j - h sum_i sx_i` on the bonds of a graph, with
/// spins represented by the values `+-1`.
pub struct Ising {
    edges: Vec<(usize, usize)>,
    h: f64,
}

impl Ising {
    pub fn new(graph: &impl Graph, h: f64) -> Self {
        Self { edges: graph.edges().to_vec(), h }
    }

    pub fn field(&self) -> f64 {
        self.h
    }
}

impl Operator for Ising {
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

        let diag: f64 = self.edges.iter().map(|&(i, j)| -v[i] * v[j]).sum();
        mel.push(Complex64::new(diag, 0.0));
        connectors.push(Vec::new());
        newconfs.push(Vec::new());

        // transverse field flips one spin at a time
        for i in 0..v.len() {
            mel.push(Complex64::new(-self.h, 0.0));
            connectors.push(vec![i]);
            newconfs.push(vec![-v[i]]);
        }
    }
}
