//! Checkpoint round-trips through the `.wf` file.

use lattice_vmc::machine::{Machine, RbmSpinSymm};
use lattice_vmc::{Hilbert, Hypercube, Spin};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_config(n: usize, rng: &mut StdRng) -> DVector<f64> {
    DVector::from_fn(n, |_, _| if rng.gen::<bool>() { 1.0 } else { -1.0 })
}

#[test]
fn saved_machine_reproduces_log_val_exactly() {
    let graph = Hypercube::new(4, 2, true).unwrap();
    let hilbert = Hilbert::Spin(Spin::new(16, 0.5).unwrap());

    let mut machine = RbmSpinSymm::new(&graph, &hilbert, 2, true, true).unwrap();
    machine.init_random_pars(20250412, 0.1).unwrap();

    let path = std::env::temp_dir().join("lattice_vmc_checkpoint_test.wf");
    machine.save(&path).unwrap();

    let state = RbmSpinSymm::read_state(&path).unwrap();
    let mut restored = RbmSpinSymm::new(&graph, &hilbert, 2, true, true).unwrap();
    restored.load_state(&state).unwrap();

    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..100 {
        let v = random_config(16, &mut rng);
        assert_eq!(machine.log_val(&v), restored.log_val(&v));
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn checkpoint_of_wrong_machine_is_rejected() {
    let graph = Hypercube::new(4, 1, true).unwrap();
    let hilbert = Hilbert::Spin(Spin::new(4, 0.5).unwrap());
    let mut machine = RbmSpinSymm::new(&graph, &hilbert, 1, true, true).unwrap();
    machine.init_random_pars(1, 0.1).unwrap();

    let path = std::env::temp_dir().join("lattice_vmc_checkpoint_mismatch.wf");
    machine.save(&path).unwrap();

    let state = RbmSpinSymm::read_state(&path).unwrap();
    let bigger_graph = Hypercube::new(8, 1, true).unwrap();
    let bigger_hilbert = Hilbert::Spin(Spin::new(8, 0.5).unwrap());
    let mut other = RbmSpinSymm::new(&bigger_graph, &bigger_hilbert, 1, true, true).unwrap();
    assert!(other.load_state(&state).is_err());

    std::fs::remove_file(&path).ok();
}
