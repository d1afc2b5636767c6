//! Lattice graphs: site enumeration, adjacency and symmetry permutations.

use log::info;

use crate::error::{Error, Result};

/// Graph capabilities consumed by the Hamiltonians and the symmetric machine.
pub trait Graph {
    fn nsites(&self) -> usize;

    /// Neighbor lists, one entry per site.
    fn adjacency(&self) -> &[Vec<usize>];

    /// Undirected bonds, each counted once with `i < j`.
    fn edges(&self) -> &[(usize, usize)];

    fn is_bipartite(&self) -> bool;

    /// Site permutation table of the symmetry group: row `t` maps each site
    /// to its image under the `t`-th group element.
    fn symmetry_table(&self) -> Result<Vec<Vec<usize>>>;
}

/// Hypercubic lattice of side `L` in `ndim` dimensions.
///
/// Sites are enumerated in row-major coordinate order. With periodic
/// boundaries the translation group provides `L^ndim` symmetry permutations;
/// without them the lattice has no translation symmetry and
/// [`Graph::symmetry_table`] fails.
pub struct Hypercube {
    length: usize,
    ndim: usize,
    pbc: bool,
    nsites: usize,
    sites: Vec<Vec<usize>>,
    adjacency: Vec<Vec<usize>>,
    edges: Vec<(usize, usize)>,
}

impl Hypercube {
    pub fn new(length: usize, ndim: usize, pbc: bool) -> Result<Self> {
        if length < 1 {
            return Err(Error::config("hypercube side must be at least 1"));
        }
        if ndim < 1 {
            return Err(Error::config("hypercube dimension must be at least 1"));
        }

        let nsites = length.pow(ndim as u32);
        let sites: Vec<Vec<usize>> = (0..nsites).map(|i| Self::coords(i, length, ndim)).collect();

        let mut edges = Vec::new();
        for (i, coord) in sites.iter().enumerate() {
            for d in 0..ndim {
                let mut neigh = coord.clone();
                if pbc {
                    neigh[d] = (coord[d] + 1) % length;
                } else if coord[d] + 1 < length {
                    neigh[d] = coord[d] + 1;
                } else {
                    continue;
                }
                let j = Self::site_index(&neigh, length);
                let bond = (i.min(j), i.max(j));
                if i != j && !edges.contains(&bond) {
                    edges.push(bond);
                }
            }
        }
        edges.sort_unstable();

        let mut adjacency = vec![Vec::new(); nsites];
        for &(i, j) in &edges {
            adjacency[i].push(j);
            adjacency[j].push(i);
        }

        info!(
            "hypercube built: L = {}, ndim = {}, pbc = {}, {} sites, {} bonds",
            length,
            ndim,
            pbc,
            nsites,
            edges.len()
        );

        Ok(Self { length, ndim, pbc, nsites, sites, adjacency, edges })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn pbc(&self) -> bool {
        self.pbc
    }

    pub fn site_coord(&self, i: usize) -> &[usize] {
        &self.sites[i]
    }

    /// Site index for a coordinate vector, last coordinate fastest.
    pub fn coord_to_site(&self, coord: &[usize]) -> usize {
        Self::site_index(coord, self.length)
    }

    fn coords(mut i: usize, length: usize, ndim: usize) -> Vec<usize> {
        let mut c = vec![0; ndim];
        for d in (0..ndim).rev() {
            c[d] = i % length;
            i /= length;
        }
        c
    }

    fn site_index(coord: &[usize], length: usize) -> usize {
        coord.iter().fold(0, |acc, &c| acc * length + c)
    }
}

impl Graph for Hypercube {
    fn nsites(&self) -> usize {
        self.nsites
    }

    fn adjacency(&self) -> &[Vec<usize>] {
        &self.adjacency
    }

    fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    fn is_bipartite(&self) -> bool {
        if self.pbc {
            self.length % 2 == 0
        } else {
            true
        }
    }

    /// Translation group: row `t` sends site `p` to the site whose
    /// coordinates are `coords(p) + coords(t)` modulo `L`.
    fn symmetry_table(&self) -> Result<Vec<Vec<usize>>> {
        if !self.pbc {
            return Err(Error::config(
                "translation symmetries require periodic boundary conditions",
            ));
        }

        let mut table = Vec::with_capacity(self.nsites);
        for t in 0..self.nsites {
            let mut row = vec![0; self.nsites];
            for p in 0..self.nsites {
                let shifted: Vec<usize> = self.sites[p]
                    .iter()
                    .zip(self.sites[t].iter())
                    .map(|(&a, &b)| (a + b) % self.length)
                    .collect();
                row[p] = self.coord_to_site(&shifted);
            }
            table.push(row);
        }
        Ok(table)
    }
}
