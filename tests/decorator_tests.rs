//! Integration tests for env injection and the active env.

use envdict::{Env, EnvDict, EnvError, Kwargs, Node, Resolver, load_env, with_env, with_env_dict};
use serde_json::json;
use serial_test::serial;

fn add_a(env: &Env, (b,): (i64,)) -> (i64, i64) {
    (env["a"].as_i64().unwrap_or_default(), b)
}

#[test]
fn test_with_env_injects_defaults() {
    let my_fn = with_env(json!({"a": 1}))
        .decorate(&["env", "b"], add_a)
        .unwrap();

    assert_eq!(my_fn.call((2,)).unwrap(), (1, 2));
    assert_eq!(my_fn.parameters(), ["b".to_string()]);
}

#[test]
fn test_with_env_override_does_not_leak() {
    let my_fn = with_env(json!({"a": 1}))
        .decorate(&["env", "b"], add_a)
        .unwrap();

    let kwargs = Kwargs::new().with("env__a", 100);
    assert_eq!(my_fn.call_with((2,), kwargs).unwrap(), (100, 2));
    assert_eq!(my_fn.call((2,)).unwrap(), (1, 2));
    assert_eq!(my_fn.env_dict().unwrap()["a"], Node::Int(1));
}

#[test]
fn test_with_env_nested_override() {
    let my_fn = with_env(json!({"a": {"b": {"c": 1}}}))
        .decorate(&["env"], |env: &Env, (): ()| env.lookup("a.b.c").cloned())
        .unwrap();

    let kwargs = Kwargs::new().with("env__a__b__c", 3);
    assert_eq!(my_fn.call_with((), kwargs).unwrap().unwrap(), Node::Int(3));
}

#[test]
fn test_override_reexpands_placeholders() {
    let defaults = EnvDict::builder()
        .source(json!({"greeting": "hello"}))
        .resolver("name", Resolver::fixed("world"))
        .build()
        .unwrap();
    let my_fn = with_env_dict(defaults)
        .decorate(&["env"], |env: &Env, (): ()| env["greeting"].clone())
        .unwrap();

    let kwargs = Kwargs::new().with("env__greeting", "hello {{name}}");
    assert_eq!(my_fn.call_with((), kwargs).unwrap(), Node::from("hello world"));
}

#[test]
fn test_override_unknown_key_fails() {
    let my_fn = with_env(json!({"a": 1}))
        .decorate(&["env"], |_: &Env, (): ()| ())
        .unwrap();

    let err = my_fn
        .call_with((), Kwargs::new().with("env__z", 1))
        .unwrap_err();
    assert!(matches!(err, EnvError::Lookup { .. }));
}

#[test]
fn test_decoration_errors_at_decoration_time() {
    let no_params = with_env(json!({"a": 1})).decorate(&[], |_: &Env, (): ()| ());
    assert!(matches!(no_params, Err(EnvError::Decoration(_))));

    let wrong_first = with_env(json!({"a": 1})).decorate(&["a", "env"], |_: &Env, (): ()| ());
    assert!(matches!(wrong_first, Err(EnvError::Decoration(_))));

    let wrong_arity = with_env(json!({"a": 1})).decorate(&["env"], add_a);
    assert!(matches!(wrong_arity, Err(EnvError::Decoration(_))));

    let bad_defaults = with_env(json!({"a__b": 1})).decorate(&["env"], |_: &Env, (): ()| ());
    assert!(matches!(bad_defaults, Err(EnvError::Validation(_))));
}

#[test]
#[serial(active_env)]
fn test_load_env_requires_start() {
    Env::end();
    let my_fn = load_env()
        .decorate(&["env"], |env: &Env, (): ()| env["a"].clone())
        .unwrap();

    assert!(matches!(my_fn.call(()), Err(EnvError::Activation)));
}

#[test]
#[serial(active_env)]
fn test_load_env_reads_active_env() {
    let my_fn = load_env()
        .decorate(&["env"], |env: &Env, (): ()| env["a"].clone())
        .unwrap();

    Env::start(json!({"a": 10})).unwrap();
    assert_eq!(my_fn.call(()).unwrap(), Node::Int(10));

    Env::start(json!({"a": 20})).unwrap();
    assert_eq!(my_fn.call(()).unwrap(), Node::Int(20));
    Env::end();
}

#[test]
#[serial(active_env)]
fn test_load_env_rejects_overrides() {
    Env::start(json!({"a": 10})).unwrap();
    let my_fn = load_env()
        .named("reader")
        .decorate(&["env"], |env: &Env, (): ()| env["a"].clone())
        .unwrap();

    let err = my_fn
        .call_with((), Kwargs::new().with("env__a", 1))
        .unwrap_err();
    assert!(matches!(err, EnvError::Decoration(ref msg) if msg.contains("reader")));
    Env::end();
}

#[test]
#[serial(active_env)]
fn test_active_env_visible_across_threads() {
    Env::start(json!({"a": 1})).unwrap();
    let seen = std::thread::spawn(|| Env::load().map(|env| env["a"].clone()))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(seen, Node::Int(1));
    Env::end();
}
