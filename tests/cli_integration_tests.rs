use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

// Helper functions to create test data
mod test_utils {
    use super::*;

    const N: u16 = 65535;

    pub fn binary() -> PathBuf {
        PathBuf::from(env!("CARGO_BIN_EXE_navgraph"))
    }

    /// 2x2 grid of unit squares on y = 0.
    pub fn create_grid_mesh_json(temp_dir: &Path) -> PathBuf {
        let verts: Vec<u16> = (0..3u16)
            .flat_map(|z| (0..3u16).flat_map(move |x| [x, 0, z]))
            .collect();
        let mesh = json!({
            "verts": verts,
            "polys": [
                0, 3, 4, 1, N, 2, 1, N,
                1, 4, 5, 2, 0, 3, N, N,
                3, 6, 7, 4, N, N, 3, 0,
                4, 7, 8, 5, 2, N, N, 1
            ],
            "regs": [0, 0, 1, 1],
            "nvp": 4,
            "cell_size": 1.0,
            "cell_height": 1.0,
            "bmin": {"x": 0.0, "y": 0.0, "z": 0.0}
        });

        let mesh_path = temp_dir.join("mesh/grid.json");
        fs::create_dir_all(mesh_path.parent().unwrap()).unwrap();
        let mut file = fs::File::create(&mesh_path).unwrap();
        file.write_all(serde_json::to_string_pretty(&mesh).unwrap().as_bytes()).unwrap();
        mesh_path
    }

    /// Large floor polygon at y = 0 with a 4x4 platform five units above it.
    pub fn create_ledge_mesh_json(temp_dir: &Path) -> PathBuf {
        let mesh = json!({
            "verts": [
                0, 0, 0, 0, 0, 25, 25, 0, 25, 25, 0, 0,
                10, 5, 10, 10, 5, 14, 14, 5, 14, 14, 5, 10
            ],
            "polys": [0, 1, 2, 3, N, N, N, N, 4, 5, 6, 7, N, N, N, N],
            "regs": [0, 1],
            "nvp": 4,
            "cell_size": 1.0,
            "cell_height": 1.0,
            "bmin": {"x": -10.0, "y": 0.0, "z": -10.0}
        });

        let mesh_path = temp_dir.join("mesh/ledge.json");
        fs::create_dir_all(mesh_path.parent().unwrap()).unwrap();
        fs::write(&mesh_path, serde_json::to_string(&mesh).unwrap()).unwrap();
        mesh_path
    }

    /// Floor quad from `min` to `max` on x and z as two triangles, 9
    /// native-endian f32 each.
    pub fn create_floor_tri_file(temp_dir: &Path, min: f32, max: f32) -> PathBuf {
        let tri_path = temp_dir.join("tri/floor.tri");
        fs::create_dir_all(tri_path.parent().unwrap()).unwrap();
        let mut file = fs::File::create(&tri_path).unwrap();

        let triangles = [
            [min, 0.0, min, min, 0.0, max, max, 0.0, max],
            [min, 0.0, min, max, 0.0, max, max, 0.0, min],
        ];
        for triangle in triangles {
            for value in triangle {
                file.write_all(&value.to_ne_bytes()).unwrap();
            }
        }
        tri_path
    }

    pub fn run(args: &[&str]) -> std::process::Output {
        Command::new(binary())
            .args(args)
            .output()
            .expect("Failed to execute command")
    }

    pub fn assert_success(output: &std::process::Output) {
        assert!(
            output.status.success(),
            "Command failed with stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn bake_grid(temp_dir: &Path, output_name: &str) -> PathBuf {
        let mesh = create_grid_mesh_json(temp_dir);
        let graph = temp_dir.join(output_name);
        let output = run(&[
            "bake",
            "--mesh",
            mesh.to_str().unwrap(),
            "--output",
            graph.to_str().unwrap(),
        ]);
        assert_success(&output);
        graph
    }
}

use test_utils::*;

#[test]
fn test_cli_bake_writes_graph() {
    let temp_dir = TempDir::new().unwrap();
    let graph = bake_grid(temp_dir.path(), "out/grid.json");
    assert!(graph.exists(), "Graph file should be created");

    let baked: Value = serde_json::from_str(&fs::read_to_string(&graph).unwrap()).unwrap();
    assert_eq!(baked["nodes"].as_array().unwrap().len(), 4);
    assert_eq!(baked["version"], 1);
}

#[test]
fn test_cli_bake_with_cache_dir() {
    let temp_dir = TempDir::new().unwrap();
    let mesh = create_grid_mesh_json(temp_dir.path());
    let cache_dir = temp_dir.path().join("cache");
    let graph = temp_dir.path().join("grid.navgraph");

    for _ in 0..2 {
        let output = run(&[
            "bake",
            "--mesh",
            mesh.to_str().unwrap(),
            "--output",
            graph.to_str().unwrap(),
            "--cache-dir",
            cache_dir.to_str().unwrap(),
        ]);
        assert_success(&output);
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Baked 4 nodes"), "Unexpected output: {stdout}");
    }
    assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 1);
}

#[test]
fn test_cli_bake_with_tri_finds_jump_links() {
    let temp_dir = TempDir::new().unwrap();
    let mesh = create_ledge_mesh_json(temp_dir.path());
    let tri = create_floor_tri_file(temp_dir.path(), -10.0, 15.0);
    let graph = temp_dir.path().join("ledge.json");

    let output = run(&[
        "bake",
        "--mesh",
        mesh.to_str().unwrap(),
        "--output",
        graph.to_str().unwrap(),
        "--tri",
        tri.to_str().unwrap(),
    ]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Baked 2 nodes (1 off-mesh links)"), "Unexpected output: {stdout}");

    let baked: Value = serde_json::from_str(&fs::read_to_string(&graph).unwrap()).unwrap();
    let links = baked["nodes"][1]["off_mesh_links"].as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["end_poly"], 0);
}

#[test]
fn test_cli_path_prints_pinned_path() {
    let temp_dir = TempDir::new().unwrap();
    let graph = bake_grid(temp_dir.path(), "grid.navgraph");
    let tri = create_floor_tri_file(temp_dir.path(), -5.0, 5.0);

    let output = run(&[
        "path",
        "--graph",
        graph.to_str().unwrap(),
        "--start",
        "0.25,0,0.25",
        "--end",
        "1.75,0,1.75",
        "--tri",
        tri.to_str().unwrap(),
        "--simplify",
        "shortcut",
        "--snap-to-ground",
    ]);
    assert_success(&output);

    let path: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(path["nodes"].as_array().unwrap().len(), 3);
    let smooth = path["smooth_path"].as_array().unwrap();
    assert!((smooth[0]["x"].as_f64().unwrap() - 0.25).abs() < 1e-9);
    assert!((smooth[smooth.len() - 1]["z"].as_f64().unwrap() - 1.75).abs() < 1e-9);
}

#[test]
fn test_cli_path_without_route_fails() {
    let temp_dir = TempDir::new().unwrap();
    let graph = bake_grid(temp_dir.path(), "grid.navgraph");

    let output = run(&[
        "path",
        "--graph",
        graph.to_str().unwrap(),
        "--start",
        "0.25,0,0.25",
        "--end",
        "-8,0,-8",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No path"));
}

#[test]
fn test_cli_batch_plans_every_request() {
    let temp_dir = TempDir::new().unwrap();
    let base_path = temp_dir.path();
    let graph = bake_grid(base_path, "grid.json");

    let requests = json!([
        {"start": {"x": 0.5, "y": 0.0, "z": 0.5}, "end": {"x": 1.5, "y": 0.0, "z": 1.5}},
        {"start": {"x": 0.5, "y": 0.0, "z": 0.5}, "end": {"x": 9.0, "y": 0.0, "z": 9.0}},
        {"start": {"x": 1.5, "y": 0.0, "z": 0.5}, "end": {"x": 0.5, "y": 0.0, "z": 1.5}}
    ]);
    let requests_path = base_path.join("requests.json");
    fs::write(&requests_path, serde_json::to_string(&requests).unwrap()).unwrap();
    let results_path = base_path.join("results/paths.json");

    let output = run(&[
        "batch",
        "--graph",
        graph.to_str().unwrap(),
        "--requests",
        requests_path.to_str().unwrap(),
        "--output",
        results_path.to_str().unwrap(),
    ]);
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Planned 2/3 paths"));

    let results: Value = serde_json::from_str(&fs::read_to_string(&results_path).unwrap()).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_object());
    assert!(results[1].is_null());
    assert!(results[2].is_object());
}

#[test]
fn test_cli_help_commands() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bake"));
    assert!(stdout.contains("path"));
    assert!(stdout.contains("batch"));

    let output = run(&["path", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--start"));
    assert!(stdout.contains("--simplify"));
}
