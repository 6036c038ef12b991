// engine.rs — Thin wrapper around the embedded Rego interpreter.
//
// All direct use of `regorus` lives here. The rest of the crate only sees
// `serde_json::Value` in and out, so the interpreter can be swapped without
// touching the backends.

use regorus::{Engine, Value};

use crate::error::PolicyError;
use crate::sources::PolicySource;

/// Version label of the policy engine, reported in every decision record.
pub const ENGINE_VERSION: &str = "regorus-0.2";

/// Create an engine with every source parsed and loaded.
pub(crate) fn compile(sources: &[PolicySource]) -> Result<Engine, PolicyError> {
    let mut engine = Engine::new();
    for source in sources {
        engine
            .add_policy(source.name.clone(), source.text.clone())
            .map_err(|e| PolicyError::Compile(e.to_string()))?;
    }
    Ok(engine)
}

/// Evaluate every rule of `package` against an empty input, so errors that
/// only show once rules are compiled (unsafe variables, unknown functions)
/// surface without a real request.
pub(crate) fn evaluate_package(engine: &mut Engine, package: &str) -> Result<(), PolicyError> {
    engine.set_input(Value::new_object());
    engine
        .eval_query(format!("data.{package}"), false)
        .map(drop)
        .map_err(|e| PolicyError::Compile(e.to_string()))
}

/// Merge a JSON data document into the engine's `data` tree.
pub(crate) fn add_data(engine: &mut Engine, json: &str) -> Result<(), PolicyError> {
    let data = Value::from_json_str(json).map_err(|e| PolicyError::Config(e.to_string()))?;
    engine
        .add_data(data)
        .map_err(|e| PolicyError::Config(e.to_string()))
}

/// Evaluate `query` against `input` and return its first value.
///
/// `Ok(None)` means the query is undefined: an empty result set or an
/// explicitly undefined expression.
pub(crate) fn query_value(
    engine: &mut Engine,
    query: &str,
    input: &serde_json::Value,
) -> Result<Option<serde_json::Value>, PolicyError> {
    let input = Value::from_json_str(&input.to_string())
        .map_err(|e| PolicyError::Evaluation(format!("input rejected by engine: {e}")))?;
    engine.set_input(input);

    let results = engine
        .eval_query(query.to_string(), false)
        .map_err(|e| PolicyError::Evaluation(e.to_string()))?;

    let first = results
        .result
        .into_iter()
        .next()
        .and_then(|result| result.expressions.into_iter().next())
        .map(|expression| expression.value);

    match first {
        None | Some(Value::Undefined) => Ok(None),
        Some(value) => {
            let json = value
                .to_json_str()
                .map_err(|e| PolicyError::Evaluation(e.to_string()))?;
            let value = serde_json::from_str(&json)
                .map_err(|e| PolicyError::Evaluation(e.to_string()))?;
            Ok(Some(value))
        }
    }
}
