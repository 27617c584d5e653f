//! Relationship phase (spec §4.7): links dependencies for "orphan"
//! components — those the graph/parse phases never walked because no query
//! triggered them — terminating early once every other discovered
//! component has been linked through.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::component::{Component, Origin};
use crate::error::{DiscoveryError, Phase, Result};
use crate::parser::ParseContext;

use super::{Engine, detect_kind, resolve_dependency_path};

pub(crate) fn run(engine: &Engine) -> Result<()> {
    let components = engine.registry.to_components();
    let discovered: HashSet<_> = components
        .iter()
        .filter(|c| engine.classifier.was_discovered(&c.path))
        .map(|c| c.path.clone())
        .collect();

    if discovered.is_empty() {
        return Ok(());
    }

    let orphans: Vec<Arc<Component>> = components
        .into_iter()
        .filter(|c| !c.has_dependencies())
        .collect();

    let mut linked_through: HashSet<std::path::PathBuf> = HashSet::new();
    let errors: Mutex<Vec<DiscoveryError>> = Mutex::new(Vec::new());
    let parse_ctx = ParseContext {
        suppress_errors: engine.config.suppress_parse_errors,
    };

    for component in orphans {
        if linked_through.len() >= discovered.len() {
            break;
        }

        if !component.has_parsed_config() {
            let config_path = engine.config_file_path(&component.path, component.kind);
            match engine.parser.parse(&config_path, &parse_ctx) {
                Ok((parsed, files_read)) => component.set_parsed_config(parsed, files_read),
                Err(e) => {
                    if engine.config.suppress_parse_errors {
                        log::debug!(
                            "suppressing parse error in {}: {}",
                            config_path.display(),
                            e.message
                        );
                        continue;
                    } else {
                        errors.lock().unwrap().push(DiscoveryError::Parse {
                            path: component.path.clone(),
                            source: anyhow::anyhow!(e.message),
                        });
                        continue;
                    }
                }
            }
        }

        let Some(config) = component.parsed_config() else {
            continue;
        };

        for dep_path in config.enabled_dependency_paths() {
            let resolved = resolve_dependency_path(&component.path, dep_path);
            let kind = detect_kind(&resolved, engine);
            let ctx = component.context.propagate(Origin::RelationshipDiscovery);
            let child = Component::new(resolved.clone(), kind, ctx);
            let (child, _created) = engine.registry.ensure(child);
            child.update_external(&engine.config.working_dir);
            engine
                .registry
                .add_dependency(&component.path, &child.path, true);
            engine.classifier.mark_discovered(child.path.clone());

            if discovered.contains(&child.path) {
                linked_through.insert(child.path.clone());
            }
        }
    }

    let collected = errors.into_inner().unwrap();
    match DiscoveryError::join(Phase::Relationship, collected) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
