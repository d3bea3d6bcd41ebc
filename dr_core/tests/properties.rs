use dr_core::{
    directional_derivative, max_abs_error, AdFlags, Error, GradPolicy, Graph, GraphConfig, Value,
};
use rstest::rstest;

fn tracked(graph: &Graph, value: Value) -> Value {
    let mut value = value;
    graph.enable_grad(&mut value).unwrap();
    value
}

#[test]
fn test_identity_chain_matches_direct_gradient() {
    let direct = {
        let graph = Graph::new();
        let a = tracked(&graph, Value::scalar(1.7));
        let out = a.sqr();
        graph.backward(&out, AdFlags::NONE).unwrap();
        graph.grad(&a).unwrap()
    };
    let chained = {
        let graph = Graph::new();
        let a = tracked(&graph, Value::scalar(1.7));
        let identity = &a * 1.0 + 0.0;
        let out = identity.sqr();
        graph.backward(&out, AdFlags::NONE).unwrap();
        graph.grad(&a).unwrap()
    };
    assert_eq!(direct, chained);
}

#[rstest]
#[case(2.0, -3.0)]
#[case(0.0, 1.0)]
#[case(-0.5, 0.25)]
#[case(1e6, -1e-6)]
fn test_backward_is_linear(#[case] c: f64, #[case] d: f64) {
    let graph = Graph::new();
    let a = tracked(&graph, Value::scalar(0.3));
    let b = tracked(&graph, Value::scalar(-1.2));
    let out = c * &a + d * &b;

    graph.backward(&out, AdFlags::NONE).unwrap();
    assert_eq!(graph.grad(&a).unwrap().item(), c);
    assert_eq!(graph.grad(&b).unwrap().item(), d);
}

#[rstest]
#[case(0.5)]
#[case(1.3)]
#[case(-0.8)]
fn test_forward_and_backward_agree(#[case] seed: f64) {
    let build = |s: &Value| {
        let color = s * &Value::rgb(0.2, 0.5, 0.8);
        (color.exp() * s.sin() + color.sqr()).sum()
    };

    let forward = {
        let graph = Graph::new();
        let s = tracked(&graph, Value::scalar(seed));
        let out = build(&s);
        graph.forward(&s, AdFlags::NONE).unwrap();
        graph.grad(&out).unwrap().item()
    };
    let backward = {
        let graph = Graph::new();
        let s = tracked(&graph, Value::scalar(seed));
        let out = build(&s);
        graph.backward(&out, AdFlags::NONE).unwrap();
        graph.grad(&s).unwrap().item()
    };
    assert!(
        (forward - backward).abs() < 1e-12,
        "forward={forward}, backward={backward}"
    );
}

#[test]
fn test_forward_mode_matches_finite_differences() {
    let point = [0.3, 0.6, 0.9];
    let direction = [1.0, 0.0, -2.0];
    let build = |v: &Value| (v.clamp(0.0, 0.8) * v.cos()).abs() + v.mean();

    let graph = Graph::new();
    let v = tracked(&graph, Value::from_vec(point.to_vec()));
    let out = build(&v);
    graph
        .forward_with(&v, &Value::from_vec(direction.to_vec()), AdFlags::NONE)
        .unwrap();

    let fd = directional_derivative(
        |p: &[f64]| build(&Value::from_vec(p.to_vec())).into_vec(),
        &point,
        &direction,
        1e-6,
    );
    assert!(max_abs_error(graph.grad(&out).unwrap().data(), &fd) < 1e-5);
}

#[test]
fn test_reset_bounds_graph_size() {
    let graph = Graph::new();
    let baseline = graph.len();
    for _ in 0..10 {
        let x = tracked(&graph, Value::rgb(0.1, 0.2, 0.3));
        let loss = (&x - 0.5).sqr().sum();
        graph.backward(&loss, AdFlags::NONE).unwrap();
        assert!(graph.len() > baseline);
        graph.reset();
        assert_eq!(graph.len(), baseline);
        assert!(!x.is_tracked());
    }
}

#[test]
fn test_growth_past_threshold_keeps_recording() {
    let _ = env_logger::builder().is_test(true).try_init();
    let graph = Graph::with_config(GraphConfig {
        node_warning_threshold: 8,
        ..GraphConfig::default()
    });
    let x = tracked(&graph, Value::scalar(1.0));
    let mut y = x.clone();
    for _ in 0..20 {
        y = &y * 1.0 + 1.0;
    }
    assert_eq!(y.item(), 21.0);
    graph.backward(&y, AdFlags::NONE).unwrap();
    assert_eq!(graph.grad(&x).unwrap().item(), 1.0);
    graph.reset();
    assert!(graph.is_empty());
}

#[test]
fn test_untracked_gradient_is_zero_by_default() {
    let graph = Graph::new();
    let v = Value::rgb(1.0, 2.0, 3.0);
    assert_eq!(graph.grad(&v).unwrap(), Value::zeros(3));
}

#[test]
fn test_untracked_gradient_fails_when_strict() {
    let graph = Graph::with_config(GraphConfig {
        grad_policy: GradPolicy::Strict,
        ..GraphConfig::default()
    });
    let v = Value::scalar(1.0);
    assert_eq!(graph.grad(&v), Err(Error::UntrackedGradientRequest));

    // a reset turns tracked values into untracked ones
    let x = tracked(&graph, Value::scalar(1.0));
    assert!(graph.grad(&x).is_ok());
    graph.reset();
    assert_eq!(graph.grad(&x), Err(Error::UntrackedGradientRequest));
}

#[test]
fn test_gradient_accumulates_across_passes() {
    let graph = Graph::new();
    let x = tracked(&graph, Value::scalar(2.0));
    let first = x.sqr();
    let second = &x * 5.0;

    graph.backward(&first, AdFlags::NONE).unwrap();
    graph.backward(&second, AdFlags::NONE).unwrap();
    assert_eq!(graph.grad(&x).unwrap().item(), 4.0 + 5.0);
}

#[test]
fn test_shared_seed_reused_with_clear_edges() {
    // theta drives three colour channels; after a forward pass that clears
    // its edges, later consumers only see the seeded tangent once.
    let graph = Graph::new();
    let theta = tracked(&graph, Value::scalar(0.5));
    let color = &theta * &Value::rgb(0.2, 0.5, 0.8);
    graph.forward(&theta, AdFlags::CLEAR_EDGES).unwrap();

    let irradiance = Value::rgb(1.0, 2.0, 4.0);
    let image = &color * &irradiance;
    let grad = graph.forward_to(&image, AdFlags::NONE).unwrap();
    assert!(max_abs_error(grad.data(), &[0.2, 1.0, 3.2]) < 1e-12);
}
