use crate::{CommandExt, tool};

#[test]
fn test_passthrough_without_snapping() {
    let input = b"LINESTRING(0 0, 10 0, 20 0)\n";

    let output = tool("snap").write_stdin(&input[..]).captured_output();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.starts_with("LINESTRING")));
}

#[test]
fn test_identity_snapping_merges_vertices() {
    // The two middle endpoints are 0.05 degrees apart and merge under a 0.1 degree radius,
    // joining the polylines into one chain of two edges
    let input = b"LINESTRING(0 0, 5 0)\nLINESTRING(5 0.05, 10 0)\n";

    let output = tool("snap")
        .arg("--snapper=identity")
        .arg("--snap-radius=0.1")
        .arg("--output-format=tgf")
        .write_stdin(&input[..])
        .captured_output();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    let separator = lines.iter().position(|&l| l == "#").unwrap();
    let nodes = separator;
    let edges = lines.len() - separator - 1;
    assert_eq!(nodes, 3);
    assert_eq!(edges, 2);
}

#[test]
fn test_split_crossing_edges() {
    let input = b"LINESTRING(-1 0, 1 0)\nLINESTRING(0 -1, 0 1)\n";

    let output = tool("snap")
        .arg("--split-crossing-edges")
        .write_stdin(&input[..])
        .captured_output();
    assert!(output.status.success());

    // Each input edge splits in two at the shared intersection vertex
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 4);
}

#[test]
fn test_int_lat_lng_rounds_coordinates() {
    let input = b"LINESTRING(0.123456789 0, 10 0)\n";

    let output = tool("snap")
        .arg("--snapper=int-lat-lng")
        .arg("--exponent=2")
        .write_stdin(&input[..])
        .captured_output();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("0.12"));
    assert!(!stdout.contains("0.123456789"));
}

#[test]
fn test_empty_input() {
    let output = tool("snap").write_stdin(&b""[..]).captured_output();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 0);
}

#[test]
fn test_simplify_collapses_near_straight_chains() {
    // Three nearly-collinear segments collapse into a single edge from end to end
    let input = b"LINESTRING(0 0, 1 0.01, 2 -0.01, 3 0)\n";

    let output = tool("snap")
        .arg("--snapper=identity")
        .arg("--snap-radius=0.2")
        .arg("--simplify")
        .write_stdin(&input[..])
        .captured_output();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1);
}
