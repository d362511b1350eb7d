use std::fs;
use std::path::Path;

use tissue_common::SimulationConfig;
use tissue_engine::checkpoint::checkpoint_path;
use tissue_engine::{Face, Tissue};

fn tumour_config(dir: &Path, layout: [usize; 3], resume: bool) -> SimulationConfig {
    let text = format!(
        r#"
        [domain]
        min_bound = 0.0
        max_bound = 600.0

        [timing]
        micro_steps_per_macro = 3
        macro_iterations = 2

        [initial_conditions]
        seed = 5807
        resume_from_checkpoint = {resume}

        [[cell_types]]
        name = "regular"
        phenotype = "host"
        count = 100
        diameter = 9.0
        can_divide = false
        placement_min = 0.0
        placement_max = 600.0

        [[cell_types]]
        name = "tumour"
        phenotype = "cancerous"
        count = 10
        diameter = 7.0
        can_divide = true
        placement_min = 250.0
        placement_max = 350.0

        [subdomains]
        layout = [{}, {}, {}]

        [output]
        base_filename = "run"
        checkpoint_dir = '{}'
        save_stats = false
        "#,
        layout[0],
        layout[1],
        layout[2],
        dir.display()
    );
    SimulationConfig::from_toml_str(&text).expect("config")
}

// Host cells only: no growth and no division, so every change in population is migration.
fn host_only_config(dir: &Path, layout: [usize; 3]) -> SimulationConfig {
    let text = format!(
        r#"
        [domain]
        min_bound = 0.0
        max_bound = 600.0

        [timing]
        micro_steps_per_macro = 5
        macro_iterations = 2

        [initial_conditions]
        seed = 11

        [[cell_types]]
        name = "regular"
        phenotype = "host"
        count = 200
        diameter = 9.0
        can_divide = false
        placement_min = 0.0
        placement_max = 600.0

        [migration]
        incoming_phenotype = "host"

        [subdomains]
        layout = [{}, {}, {}]

        [output]
        base_filename = "run"
        checkpoint_dir = '{}'
        save_stats = false
        "#,
        layout[0],
        layout[1],
        layout[2],
        dir.display()
    );
    SimulationConfig::from_toml_str(&text).expect("config")
}

#[test]
fn subdomain_starts_with_configured_population() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut tissue = Tissue::new(tumour_config(dir.path(), [1, 1, 1], false)).expect("tissue");
    assert_eq!(tissue.subdomains()[0].cells_population, vec![100, 10]);
    assert_eq!(tissue.subdomains()[0].cells_mass, vec![0.0, 0.0]);

    tissue.run_macro_iteration().expect("macro-iteration");
    let snapshot = &tissue.snapshots()[0];
    assert_eq!(snapshot.population[0], 100);
    assert!(snapshot.population[1] >= 10);
    assert!(snapshot.mass.iter().all(|&m| m > 0.0));
    // A single subdomain never migrates.
    assert_eq!(snapshot.escaped, [0; 6]);
    assert!(checkpoint_path(dir.path(), 0).exists());
}

#[test]
fn migrants_are_conserved_between_neighbours() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut tissue = Tissue::new(host_only_config(dir.path(), [2, 1, 1])).expect("tissue");
    tissue.run_macro_iteration().expect("first macro-iteration");

    let snapshots = tissue.snapshots().to_vec();
    assert_eq!(snapshots.len(), 2);
    let escaped: u32 = snapshots.iter().flat_map(|s| s.escaped).sum();
    assert!(escaped > 0);
    for snapshot in &snapshots {
        let left: u32 = snapshot.escaped.iter().sum();
        assert_eq!(snapshot.total_population() + left, 200);
    }

    // Only the shared x face connects the two subdomains.
    let to_right = snapshots[0].escaped[Face::XMax.index()];
    let to_left = snapshots[1].escaped[Face::XMin.index()];
    let subdomains = tissue.subdomains();
    assert_eq!(subdomains[1].incoming.get(Face::XMin), to_right);
    assert_eq!(subdomains[0].incoming.get(Face::XMax), to_left);
    assert_eq!(subdomains[0].incoming.total() + subdomains[1].incoming.total(), to_right + to_left);
    assert_eq!(tissue.lost_migrants(), escaped - to_right - to_left);
    assert!(subdomains.iter().all(|s| s.escaped.total() == 0));

    tissue.run_macro_iteration().expect("second macro-iteration");
    let second = &tissue.snapshots()[2..];
    assert_eq!(second.len(), 2);
    assert!(second.iter().all(|s| s.resumed));
    assert_eq!(second[0].incoming[Face::XMax.index()], to_left);
    assert_eq!(second[1].incoming[Face::XMin.index()], to_right);
}

#[test]
fn runs_resume_only_when_asked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut first = Tissue::new(tumour_config(dir.path(), [1, 1, 1], false)).expect("tissue");
    first.run().expect("run");
    let last = first.snapshots().last().cloned().expect("snapshot");
    assert!(last.resumed);

    let mut resumed = Tissue::new(tumour_config(dir.path(), [1, 1, 1], true)).expect("tissue");
    resumed.run_macro_iteration().expect("macro-iteration");
    assert!(resumed.snapshots()[0].resumed);
    // Hosts neither divide nor change type across the checkpoint.
    assert_eq!(resumed.snapshots()[0].population[0], last.population[0]);
    assert!(resumed.snapshots()[0].population[1] >= last.population[1]);

    let mut fresh = Tissue::new(tumour_config(dir.path(), [1, 1, 1], false)).expect("tissue");
    assert!(!checkpoint_path(dir.path(), 0).exists());
    fresh.run_macro_iteration().expect("macro-iteration");
    assert!(!fresh.snapshots()[0].resumed);
}

#[test]
fn malformed_checkpoint_only_stops_its_subdomain() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(checkpoint_path(dir.path(), 1), "0 300 300 300 7 1 1 0 0\n1 300 300\n").expect("write");

    let mut tissue = Tissue::new(tumour_config(dir.path(), [2, 1, 1], true)).expect("tissue");
    tissue.run_macro_iteration().expect("batch continues");
    assert!(!tissue.is_failed(0));
    assert!(tissue.is_failed(1));
    assert_eq!(tissue.snapshots().len(), 1);
    assert_eq!(tissue.snapshots()[0].subdomain_id, 0);

    tissue.run_macro_iteration().expect("batch continues");
    assert_eq!(tissue.snapshots().len(), 2);
    assert!(tissue.snapshots().iter().all(|s| s.subdomain_id == 0));
}

#[test]
fn batch_stops_when_every_subdomain_failed() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(checkpoint_path(dir.path(), 0), "not a checkpoint\n").expect("write");
    let mut tissue = Tissue::new(tumour_config(dir.path(), [1, 1, 1], true)).expect("tissue");
    assert!(tissue.run_macro_iteration().is_err());
    assert!(tissue.is_failed(0));
}
