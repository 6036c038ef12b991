// syntax.rs — Offline policy check (`--check`).
//
// Two passes over the modules under the policy location:
//
//   1. parse each file on its own, so every file with a syntax error is
//      listed, not just the first;
//   2. when all files parse, load them together into one engine and evaluate
//      each package, which compiles its rules and reports semantic errors
//      (unsafe variables, calls to unknown functions).
//
// Pass 2 only runs when pass 1 is clean: a package may depend on rules in a
// file that failed to parse.

use std::path::Path;

use crate::engine;
use crate::sources::{self, PolicySource};

/// Check the policy at `location` (a file or a directory of `.rego` files).
///
/// Returns one message per problem; an empty list means the policy is valid.
pub fn check_syntax(location: &Path) -> Vec<String> {
    let files = match sources::rego_files(location) {
        Ok(files) => files,
        Err(e) => return vec![e.to_string()],
    };

    let mut errors = Vec::new();
    let mut parsed = Vec::new();
    for file in files {
        let checked = sources::read_source(&file).and_then(|source| {
            engine::compile(std::slice::from_ref(&source))?;
            Ok(source)
        });
        match checked {
            Ok(source) => parsed.push(source),
            Err(e) => errors.push(format!("{}: {}", file.display(), e)),
        }
    }

    if errors.is_empty() {
        errors = compile_errors(&parsed);
    }
    errors
}

fn compile_errors(sources: &[PolicySource]) -> Vec<String> {
    let mut engine = match engine::compile(sources) {
        Ok(engine) => engine,
        Err(e) => return vec![e.to_string()],
    };

    let mut errors: Vec<String> = Vec::new();
    let mut seen_packages = Vec::new();
    for source in sources {
        let Some(package) = source.package() else {
            continue;
        };
        if seen_packages.contains(&package) {
            continue;
        }
        seen_packages.push(package);

        if let Err(e) = engine::evaluate_package(&mut engine, package) {
            let message = format!("{}: {}", source.name, e);
            // One bad rule can fail the evaluation of several packages.
            if !errors.iter().any(|seen| seen.ends_with(&e.to_string())) {
                errors.push(message);
            }
        }
    }
    errors
}
