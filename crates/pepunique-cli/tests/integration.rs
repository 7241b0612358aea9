use pepunique_cli::input::Input;
use pepunique_cli::output::{BINS_FILE, MATCHES_FILE, PROTEINS_FILE};
use pepunique_cli::runner::Runner;
use std::path::{Path, PathBuf};

const FEATURES: &str = "id\tname\tmass\tnet\tnet_stdev\tdiscriminant_score
1\tPEPTIDEK\t1000.0\t0.50\t\t
2\tPEPTLDEK\t1000.002\t0.50\t0.01\t0.9
3\tSAMPLER\t1500.0\t0.20\t\t
4\tSAMPLERR\t1500.001\t0.21\t\t
5\tSAMPLERK\t1500.002\t0.20\t\t
6\tLONELYK\t2400.0\t0.70\t\t
";

const LINKS: &str = "protein\tpeptide_id\tcleavage_state
PROT_A\t1\tfull
PROT_A\t6\tfull
PROT_B\t3\tpartial
PROT_B\t4\t
PROT_B\t4\tfull
";

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pepunique-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| line.split('\t').map(String::from).collect())
        .collect()
}

#[test]
fn end_to_end() -> anyhow::Result<()> {
    let dir = scratch("e2e");
    let features = dir.join("features.tsv");
    let links = dir.join("links.tsv");
    std::fs::write(&features, FEATURES)?;
    std::fs::write(&links, LINKS)?;
    let output = dir.join("out");

    let input: Input = serde_json::from_value(serde_json::json!({
        "features": features,
        "protein_links": links,
        "output_directory": output,
        "use_ellipse_region": false,
        "thresholds": [
            { "mass_tolerance": 5.0, "net_tolerance": 0.05 },
            { "mass_tolerance": 0.5, "net_tolerance": 0.05 }
        ]
    }))?;
    let search = Runner::new(input.build()?)?.run()?;

    assert_eq!(search.summaries.len(), 2);
    // 1<->2 unique pair, 3/4/5 mutually ambiguous, 6 alone
    let wide = &search.summaries[0];
    assert_eq!((wide.unique, wide.non_unique, wide.unmatched), (2, 3, 1));
    // Closest pair is 0.67 ppm apart
    let narrow = &search.summaries[1];
    assert_eq!(narrow.unmatched, 6);

    let matches = read_rows(&output.join(MATCHES_FILE));
    assert_eq!(matches[0][0], "threshold_index");
    assert_eq!(matches[0].len(), 9);
    let level0 = matches[1..].iter().filter(|r| r[0] == "0").count();
    // 1 and 2 one match each, 3/4/5 two each
    assert_eq!(level0, 8);

    let bins = read_rows(&output.join(BINS_FILE));
    assert_eq!(bins[0].last().map(String::as_str), Some("matches_3_or_more"));
    assert!(bins[1..].iter().all(|r| r.len() == bins[0].len()));

    let proteins = read_rows(&output.join(PROTEINS_FILE));
    assert_eq!(
        proteins[1],
        vec!["0", "PROT_A", "1", "2", "1"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
    assert_eq!(
        proteins[2],
        vec!["0", "PROT_B", "2", "2", "0"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );

    assert!(output.join("results.json").exists());
    assert!(search
        .output_paths
        .iter()
        .any(|p| p.ends_with("results.json")));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn matches_can_be_suppressed() -> anyhow::Result<()> {
    let dir = scratch("no-matches");
    let features = dir.join("features.tsv");
    std::fs::write(&features, FEATURES)?;

    let input: Input = serde_json::from_value(serde_json::json!({
        "features": features,
        "output_directory": dir,
        "write_matches": false
    }))?;
    let search = Runner::new(input.build()?)?.run()?;

    assert!(!dir.join(MATCHES_FILE).exists());
    assert!(!dir.join(PROTEINS_FILE).exists());
    assert!(dir.join(BINS_FILE).exists());
    assert_eq!(search.summaries.len(), 1);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn negative_mass_rejected() -> anyhow::Result<()> {
    let dir = scratch("negative");
    let features = dir.join("features.tsv");
    std::fs::write(
        &features,
        "id\tname\tmass\tnet\n1\tA\t1000.0\t0.5\n2\tB\t-5.0\t0.5\n",
    )?;

    let input: Input = serde_json::from_value(serde_json::json!({
        "features": features,
        "output_directory": dir
    }))?;
    let err = Runner::new(input.build()?).err().unwrap();
    assert!(err.to_string().contains("line 3"));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn comparison_file_same_as_features() -> anyhow::Result<()> {
    let dir = scratch("same-file");
    let features = dir.join("features.tsv");
    std::fs::write(&features, FEATURES)?;

    let input: Input = serde_json::from_value(serde_json::json!({
        "features": features,
        "comparison_features": features,
        "output_directory": dir,
        "use_ellipse_region": false,
        "thresholds": [{ "mass_tolerance": 5.0, "net_tolerance": 0.05 }]
    }))?;
    let search = Runner::new(input.build()?)?.run()?;

    // Same counts as comparing the features against each other
    let level = &search.summaries[0];
    assert_eq!((level.unique, level.non_unique, level.unmatched), (2, 3, 1));
    let matches = read_rows(&dir.join(MATCHES_FILE));
    assert!(matches[1..].iter().all(|r| r[1] != r[4]));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
