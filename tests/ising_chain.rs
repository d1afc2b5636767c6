//! End-to-end optimization of the critical transverse-field Ising chain.

use lattice_vmc::parallel::LocalTransport;
use lattice_vmc::sampling::{MetropolisLocal, Sr};
use lattice_vmc::Input;

// 10-site periodic chain at h = 1: exact ground-state energy
const EXACT_ENERGY: f64 = -12.7818;

fn input_json(output_base: &str) -> String {
    format!(
        r#"{{
            "Graph": {{ "Name": "Hypercube", "L": 10, "Dimension": 1, "Pbc": true }},
            "Hilbert": {{ "Name": "Spin", "Nspins": 10, "S": 0.5 }},
            "Hamiltonian": {{ "Name": "Ising", "h": 1.0 }},
            "Machine": {{ "Name": "RbmSpinSymm", "Alpha": 1, "Seed": 1234, "Sigma": 0.01 }},
            "Sampler": {{ "Name": "MetropolisLocal", "Seed": 271828 }},
            "Optimizer": {{ "Name": "Sgd", "LearningRate": 0.1 }},
            "Learning": {{
                "Method": "Sr",
                "Nsamples": 1000,
                "NiterOpt": 100,
                "DiagShift": 0.1,
                "UseIterative": false,
                "OutputFile": "{output_base}"
            }}
        }}"#
    )
}

#[test]
fn ising_chain_converges_to_the_exact_ground_state() {
    let base = std::env::temp_dir().join("lattice_vmc_ising_chain");
    let base = base.to_str().unwrap().to_string();

    let input = Input::from_str(&input_json(&base)).unwrap();
    let transport = LocalTransport;

    let graph = input.graph.build().unwrap();
    let hilbert = input.hilbert.build().unwrap();
    let hamiltonian = input.hamiltonian.build(&graph).unwrap();
    let machine = input.machine.build(&graph, &hilbert).unwrap();
    input.sampler.validate().unwrap();
    let sampler =
        MetropolisLocal::new(machine, hilbert, &transport, input.sampler.seed).unwrap();
    let stepper = input.optimizer.build().unwrap();
    let options = input.learning.build().unwrap();

    let mut learning = Sr::new(hamiltonian, sampler, stepper, transport, options).unwrap();
    let result = learning.run().unwrap();

    assert_eq!(result.energy_history.len(), 100);

    let tail = &result.energy_history[80..];
    let energy: f64 = tail.iter().sum::<f64>() / tail.len() as f64;
    let relative = (energy - EXACT_ENERGY).abs() / EXACT_ENERGY.abs();
    assert!(
        relative < 0.01,
        "energy {energy:.4} deviates from {EXACT_ENERGY} by {:.2}%",
        100.0 * relative
    );

    let acc_tail = &result.acceptance_history[80..];
    let acceptance: f64 = acc_tail.iter().sum::<f64>() / acc_tail.len() as f64;
    assert!(
        (0.3..=0.7).contains(&acceptance),
        "acceptance ratio {acceptance:.3} outside the expected window"
    );

    // the log file holds one record per iteration, in order
    let log_text = std::fs::read_to_string(format!("{base}.log")).unwrap();
    let log: serde_json::Value = serde_json::from_str(&log_text).unwrap();
    let records = log["Output"].as_array().unwrap();
    assert_eq!(records.len(), 100);
    for (t, record) in records.iter().enumerate() {
        assert_eq!(record["Iteration"].as_u64().unwrap(), t as u64);
        assert!(record["Energy"]["Mean"].is_number());
        assert!(record["Energy"]["Sigma"].is_number());
        assert!(record["EnergyVariance"]["Mean"].is_number());
    }

    std::fs::remove_file(format!("{base}.log")).ok();
    std::fs::remove_file(format!("{base}.wf")).ok();
}

#[test]
fn gradient_descent_also_lowers_the_energy() {
    let base = std::env::temp_dir().join("lattice_vmc_ising_gd");
    let base = base.to_str().unwrap().to_string();

    let mut input = Input::from_str(&input_json(&base)).unwrap();
    input.learning.method = "Gd".to_string();
    input.learning.niter_opt = 50;
    let transport = LocalTransport;

    let graph = input.graph.build().unwrap();
    let hilbert = input.hilbert.build().unwrap();
    let hamiltonian = input.hamiltonian.build(&graph).unwrap();
    let machine = input.machine.build(&graph, &hilbert).unwrap();
    let sampler =
        MetropolisLocal::new(machine, hilbert, &transport, input.sampler.seed).unwrap();
    let stepper = input.optimizer.build().unwrap();
    let options = input.learning.build().unwrap();

    let mut learning = Sr::new(hamiltonian, sampler, stepper, transport, options).unwrap();
    let result = learning.run().unwrap();

    let first: f64 = result.energy_history[..5].iter().sum::<f64>() / 5.0;
    let last: f64 = result.energy_history[45..].iter().sum::<f64>() / 5.0;
    assert!(last < first, "plain gradient descent should still make progress");

    std::fs::remove_file(format!("{base}.log")).ok();
    std::fs::remove_file(format!("{base}.wf")).ok();
}
