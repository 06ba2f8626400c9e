use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use navgraph::collisions::{CollisionChecker, RayCaster, Triangle};
use navgraph::config::{NavConfig, OcclusionMode, PortalMode, SimplifyStrategy};
use navgraph::error::NavError;
use navgraph::mesh::PolygonMeshData;
use navgraph::nav::{Nav, NodeFlags};
use navgraph::position::Position;
use navgraph::provider::{NavigationPath, NavigationProvider, plan_path};
use navgraph::smoothing::{PathPoint, extract_portals, smooth_path};

mod test_utils {
    use super::*;
    use serde_json::json;

    const N: u16 = 65535;

    /// 2x2 grid of unit squares on y = 0.
    pub fn grid_mesh() -> PolygonMeshData {
        let verts: Vec<u16> = (0..3u16)
            .flat_map(|z| (0..3u16).flat_map(move |x| [x, 0, z]))
            .collect();
        serde_json::from_value(json!({
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
        }))
        .unwrap()
    }

    /// Five unit squares in an L: along x on z = 0, then up along z on x = 2.
    pub fn corridor_mesh() -> PolygonMeshData {
        // Vertex grid is 4 wide (x) by 4 deep (z); index = z * 4 + x.
        let verts: Vec<u16> = (0..4u16)
            .flat_map(|z| (0..4u16).flat_map(move |x| [x, 0, z]))
            .collect();
        let cell = |x: u16, z: u16| {
            let v = |x: u16, z: u16| z * 4 + x;
            [v(x, z), v(x, z + 1), v(x + 1, z + 1), v(x + 1, z)]
        };
        let slot = |x: u16, z: u16, neighbours: [u16; 4]| {
            let mut entries = cell(x, z).to_vec();
            entries.extend(neighbours);
            entries
        };
        // Edges per slot: west, north, east, south.
        let polys: Vec<u16> = [
            slot(0, 0, [N, N, 1, N]),
            slot(1, 0, [0, N, 2, N]),
            slot(2, 0, [1, 3, N, N]),
            slot(2, 1, [N, 4, N, 2]),
            slot(2, 2, [N, N, N, 3]),
        ]
        .concat();
        serde_json::from_value(json!({
            "verts": verts,
            "polys": polys,
            "regs": [0, 0, 0, 0, 0],
            "nvp": 4,
            "cell_size": 1.0,
            "cell_height": 1.0,
            "bmin": {"x": 0.0, "y": 0.0, "z": 0.0}
        }))
        .unwrap()
    }

    /// Three unit squares along x: flat at y = 0, a ramp up to y = 1, flat again.
    pub fn ramp_strip_mesh() -> PolygonMeshData {
        let height = |x: u16| if x >= 2 { 1 } else { 0 };
        let verts: Vec<u16> = (0..2u16)
            .flat_map(|z| (0..4u16).flat_map(move |x| [x, height(x), z]))
            .collect();
        let v = |x: u16, z: u16| z * 4 + x;
        let polys: Vec<u16> = [
            [v(0, 0), v(0, 1), v(1, 1), v(1, 0), N, N, 1, N],
            [v(1, 0), v(1, 1), v(2, 1), v(2, 0), 0, N, 2, N],
            [v(2, 0), v(2, 1), v(3, 1), v(3, 0), 1, N, N, N],
        ]
        .concat();
        serde_json::from_value(json!({
            "verts": verts,
            "polys": polys,
            "regs": [0, 0, 0],
            "nvp": 4,
            "cell_size": 1.0,
            "cell_height": 1.0,
            "bmin": {"x": 0.0, "y": 0.0, "z": 0.0}
        }))
        .unwrap()
    }

    pub fn floor(size: f64) -> CollisionChecker {
        let a = Position::new(-size, 0.0, -size);
        let b = Position::new(-size, 0.0, size);
        let c = Position::new(size, 0.0, size);
        let d = Position::new(size, 0.0, -size);
        CollisionChecker::new(vec![Triangle::new(a, b, c), Triangle::new(a, c, d)])
    }

    pub fn assert_pinned(path: &NavigationPath, start: &Position, goal: &Position) {
        assert!(path.smooth_path.first().unwrap().approx_eq(start, 1e-9));
        assert!(path.smooth_path.last().unwrap().approx_eq(goal, 1e-9));
        assert!(path.raw_path.first().unwrap().approx_eq(start, 1e-9));
    }
}

use test_utils::*;

#[test]
fn test_get_path_requires_graph() {
    let mut provider = NavigationProvider::new(NavConfig::default());
    let result = provider.get_path(&Position::new(0.5, 0.0, 0.5), &Position::new(1.5, 0.0, 1.5));
    assert!(matches!(result, Err(NavError::GraphNotBuilt)));
    assert!(provider.last_path().is_none());
}

#[test]
fn test_grid_path_is_pinned() {
    let mut provider = NavigationProvider::new(NavConfig::default());
    provider.build_graph(&grid_mesh());
    assert_eq!(provider.graph().unwrap().len(), 4);

    let start = Position::new(0.0, 0.0, 0.0);
    let goal = Position::new(1.75, 0.0, 1.75);
    let path = provider.get_path(&start, &goal).unwrap().unwrap();

    assert_eq!(path.nodes.len(), 3);
    assert_pinned(&path, &start, &goal);
    assert!(path.cost > 0.0);
    assert_eq!(provider.last_path(), Some(&path));
    assert_eq!(path.closest_waypoint_index(&start), Some(0));
    assert_eq!(
        path.closest_waypoint_index(&goal),
        Some(path.smooth_path.len() - 1)
    );
}

#[test]
fn test_unreachable_request_keeps_last_path() {
    let mut provider = NavigationProvider::new(NavConfig::default());
    provider.build_graph(&grid_mesh());

    let first = provider
        .get_path(&Position::new(0.5, 0.0, 0.5), &Position::new(1.5, 0.0, 0.5))
        .unwrap()
        .unwrap();
    let missing = provider
        .get_path(&Position::new(0.5, 0.0, 0.5), &Position::new(9.0, 0.0, 9.0))
        .unwrap();
    assert!(missing.is_none());
    assert_eq!(provider.last_path(), Some(&first));
}

#[test]
fn test_goal_far_below_is_appended() {
    let nav = Nav::build(&grid_mesh(), &NavConfig::default(), None);
    let start = Position::new(0.5, 0.0, 0.5);
    // Located on poly 3 by projection, but three units under it.
    let goal = Position::new(1.5, -3.0, 1.5);
    let path = plan_path(&nav, &NavConfig::default(), None, &start, &goal).unwrap();

    let raw_len = path.raw_path.len();
    assert!(path.raw_path[raw_len - 1].approx_eq(&goal, 1e-9));
    assert!(path.raw_path[raw_len - 2].y.abs() < 1e-9);
    assert!(path.smooth_path.last().unwrap().approx_eq(&goal, 1e-9));
}

#[test]
fn test_portals_are_inset_towards_centroid() {
    let nav = Nav::build(&grid_mesh(), &NavConfig::default(), None);
    let start = Position::new(0.5, 0.0, 0.5);
    let goal = Position::new(1.5, 0.0, 0.5);
    let route = nav.find_path(&start, &goal).unwrap().path;

    let portals = extract_portals(&nav, &route, &start, &goal, PortalMode::EdgeMidpoint, 0.3);
    assert_eq!(portals.len(), 3);
    assert!(portals[1].position.approx_eq(&Position::new(0.7, 0.0, 0.5), 1e-9));

    let portals = extract_portals(&nav, &route, &start, &goal, PortalMode::ClosestEdgePoint, 0.0);
    assert!(portals[1].position.approx_eq(&Position::new(1.0, 0.0, 0.5), 1e-9));
}

#[test]
fn test_every_strategy_pins_endpoints() {
    let mesh = corridor_mesh();
    let start = Position::new(0.5, 0.0, 0.5);
    let goal = Position::new(2.5, 0.0, 2.5);
    let checker = floor(10.0);

    for simplify in [
        SimplifyStrategy::Rdp { xz_only: false },
        SimplifyStrategy::Rdp { xz_only: true },
        SimplifyStrategy::Shortcut,
    ] {
        for occlusion in [OcclusionMode::NavEdges, OcclusionMode::Scene] {
            let mut config = NavConfig::default();
            config.smoothing.simplify = simplify;
            config.smoothing.occlusion = occlusion;
            config.smoothing.snap_to_ground = true;

            let nav = Nav::build(&mesh, &config, None);
            let path = plan_path(&nav, &config, Some(&checker as &dyn RayCaster), &start, &goal)
                .unwrap_or_else(|| panic!("no path for {simplify:?} {occlusion:?}"));
            assert_eq!(path.nodes, vec![0, 1, 2, 3, 4]);
            assert_pinned(&path, &start, &goal);
            assert!(path.simple_path.len() <= path.dense_path.len());
        }
    }
}

#[test]
fn test_nav_edge_shortcut_keeps_the_corner() {
    let mesh = corridor_mesh();
    let mut config = NavConfig::default();
    config.smoothing.simplify = SimplifyStrategy::Shortcut;
    config.smoothing.occlusion = OcclusionMode::NavEdges;
    config.smoothing.string_pull_tolerance = 0.0;
    let nav = Nav::build(&mesh, &config, None);

    let start = Position::new(0.5, 0.0, 0.5);
    let goal = Position::new(2.5, 0.0, 2.5);
    let route = nav.find_path(&start, &goal).unwrap().path;
    let smoothed = smooth_path(&nav, &route, &start, &goal, &config, None);

    // The direct line cuts over empty space, so a corner waypoint survives.
    assert!(smoothed.simple.len() >= 3);
    for pair in smoothed.simple.windows(2) {
        assert!(
            nav.edge_raycast(&pair[0].position, &pair[1].position, 0.5, 1.0)
                .is_none(),
            "segment {:?} -> {:?} leaves the mesh",
            pair[0].position,
            pair[1].position
        );
    }
}

#[test]
fn test_every_strategy_keeps_ramp_waypoints() {
    let mesh = ramp_strip_mesh();
    let start = Position::new(0.5, 0.0, 0.5);
    let goal = Position::new(2.5, 1.0, 0.5);

    for strategy in [
        SimplifyStrategy::Rdp { xz_only: false },
        SimplifyStrategy::Rdp { xz_only: true },
        SimplifyStrategy::Shortcut,
    ] {
        let mut config = NavConfig::default();
        config.smoothing.simplify = strategy;
        let nav = Nav::build(&mesh, &config, None);
        assert!(nav.node(1).unwrap().flags.contains(NodeFlags::RAMP));
        assert!(!nav.node(0).unwrap().flags.contains(NodeFlags::RAMP));

        let route = nav.find_path(&start, &goal).unwrap().path;
        assert_eq!(route, vec![0, 1, 2]);
        let smoothed = smooth_path(&nav, &route, &start, &goal, &config, None);

        let is_ramp = |point: &PathPoint| point.flags.intersects(config.smoothing.keep_mask);
        assert!(smoothed.raw.iter().any(is_ramp));
        assert!(
            smoothed.simple.iter().any(is_ramp),
            "{strategy:?} dropped the ramp waypoint: {:?}",
            smoothed.simple
        );
    }
}

#[test]
fn test_provider_uses_scene_for_jump_links() {
    let mesh: PolygonMeshData = serde_json::from_value(serde_json::json!({
        "verts": [
            0, 0, 0, 0, 0, 25, 25, 0, 25, 25, 0, 0,
            10, 5, 10, 10, 5, 14, 14, 5, 14, 14, 5, 10
        ],
        "polys": [0, 1, 2, 3, 65535, 65535, 65535, 65535, 4, 5, 6, 7, 65535, 65535, 65535, 65535],
        "regs": [0, 1],
        "nvp": 4,
        "cell_size": 1.0,
        "cell_height": 1.0,
        "bmin": {"x": -10.0, "y": 0.0, "z": -10.0}
    }))
    .unwrap();
    let a = Position::new(-10.0, 0.0, -10.0);
    let b = Position::new(-10.0, 0.0, 15.0);
    let c = Position::new(15.0, 0.0, 15.0);
    let d = Position::new(15.0, 0.0, -10.0);
    let scene = CollisionChecker::with_layers(
        vec![Triangle::new(a, b, c), Triangle::new(a, c, d)],
        vec![navgraph::constants::JUMP_LINK_LAYER; 2],
    );

    let mut provider = NavigationProvider::new(NavConfig::default()).with_ray_caster(Arc::new(scene));
    provider.build_graph(&mesh);

    let start = Position::new(2.0, 5.0, 2.0);
    let goal = Position::new(10.0, 0.0, 10.0);
    let path = provider.get_path(&start, &goal).unwrap().unwrap();
    assert_eq!(path.nodes, vec![1, 0]);
    assert!((path.cost - 30.0).abs() < 1e-9);
    assert_pinned(&path, &start, &goal);
}

#[test]
fn test_json_and_binary_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let nav = Nav::build(&grid_mesh(), &NavConfig::default(), None);
    let start = Position::new(0.25, 0.0, 0.25);
    let goal = Position::new(1.75, 0.0, 1.75);
    let expected = nav.find_path(&start, &goal).unwrap();

    let json_path = temp_dir.path().join("graphs/grid.json");
    nav.save_to_json(&json_path).unwrap();
    let from_json = Nav::from_json(&json_path).unwrap();

    let bin_path = temp_dir.path().join("graphs/grid.navgraph");
    nav.save_to_binary(&bin_path).unwrap();
    let from_binary = Nav::from_binary(&bin_path).unwrap();

    for loaded in [from_json, from_binary] {
        assert_eq!(loaded.len(), nav.len());
        assert_eq!(loaded.graph.edge_count(), nav.graph.edge_count());
        let result = loaded.find_path(&start, &goal).unwrap();
        assert_eq!(result.path, expected.path);
        assert!((result.cost - expected.cost).abs() < 1e-9);
    }
}

#[test]
fn test_load_or_build_caches_by_content() {
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().join("cache");
    let mesh = grid_mesh();
    let config = NavConfig::default();

    let built = Nav::load_or_build(&mesh, &config, None, &cache_dir).unwrap();
    let cached: Vec<_> = fs::read_dir(&cache_dir).unwrap().collect();
    assert_eq!(cached.len(), 1);

    let loaded = Nav::load_or_build(&mesh, &config, None, &cache_dir).unwrap();
    assert_eq!(loaded.len(), built.len());
    assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 1);

    let other = NavConfig {
        keep_unverified_neighbours: true,
        ..NavConfig::default()
    };
    Nav::load_or_build(&mesh, &other, None, &cache_dir).unwrap();
    assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 2);
}

#[test]
fn test_config_round_trip_and_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(
        &path,
        r#"{"jump_link_min_cost": 12.5, "smoothing": {"simplify": {"kind": "shortcut"}}}"#,
    )
    .unwrap();

    let config = NavConfig::from_json(&path).unwrap();
    assert!((config.jump_link_min_cost - 12.5).abs() < f64::EPSILON);
    assert_eq!(config.smoothing.simplify, SimplifyStrategy::Shortcut);
    assert_eq!(config.smoothing.points_per_segment, 10);

    let saved = temp_dir.path().join("saved/config.json");
    config.save_to_json(&saved).unwrap();
    assert_eq!(NavConfig::from_json(&saved).unwrap(), config);
}

#[test]
fn test_navigation_path_saves_to_json() {
    let temp_dir = TempDir::new().unwrap();
    let nav = Nav::build(&grid_mesh(), &NavConfig::default(), None);
    let path = plan_path(
        &nav,
        &NavConfig::default(),
        None,
        &Position::new(0.5, 0.0, 0.5),
        &Position::new(1.5, 0.0, 1.5),
    )
    .unwrap();

    let file = temp_dir.path().join("paths/path.json");
    path.save_to_json(&file).unwrap();
    let loaded: NavigationPath = serde_json::from_reader(fs::File::open(&file).unwrap()).unwrap();
    assert_eq!(loaded.nodes, path.nodes);
    assert_eq!(loaded.smooth_path.len(), path.smooth_path.len());
    for (a, b) in loaded.smooth_path.iter().zip(&path.smooth_path) {
        assert!(a.approx_eq(b, 1e-9));
    }
}
