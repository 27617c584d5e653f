//! Parse phase (spec §4.5): runs the HCL parser over every *requires-parse*
//! candidate (and, when forced, every unit) and re-classifies with parse
//! data available.

use std::sync::Mutex;

use rayon::prelude::*;

use crate::component::Component;
use crate::error::{DiscoveryError, Phase, Result};
use crate::filters::EvalContext;
use crate::filters::classifier::{ClassificationReason, ClassificationStatus, ParseAvailability};
use crate::parser::ParseContext;

use super::{Engine, relative_display};

pub(crate) fn run(engine: &Engine) -> Result<()> {
    let force_all =
        engine.config.parse_exclude || engine.config.parse_includes || engine.config.read_files;

    let targets: Vec<_> = engine
        .registry
        .to_components()
        .into_iter()
        .filter(|c| force_all || engine.classifier.needs_parse(&c.path))
        .collect();

    if targets.is_empty() {
        return Ok(());
    }

    let errors: Mutex<Vec<DiscoveryError>> = Mutex::new(Vec::new());
    let parse_ctx = ParseContext {
        suppress_errors: engine.config.suppress_parse_errors,
    };

    engine.with_worker_pool(|| {
        targets.par_iter().for_each(|component| {
            parse_one(engine, component, &parse_ctx, &errors);
        });
    });

    let collected = errors.into_inner().unwrap();
    match DiscoveryError::join(Phase::Parse, collected) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn parse_one(
    engine: &Engine,
    component: &std::sync::Arc<Component>,
    parse_ctx: &ParseContext,
    errors: &Mutex<Vec<DiscoveryError>>,
) {
    let config_path = engine.config_file_path(&component.path, component.kind);
    match engine.parser.parse(&config_path, parse_ctx) {
        Ok((parsed, files_read)) => {
            component.set_parsed_config(parsed, files_read);
            reclassify(engine, component);
        }
        Err(parse_err) => {
            if engine.config.suppress_parse_errors {
                log::debug!(
                    "suppressing parse error in {}: {}",
                    config_path.display(),
                    parse_err.message
                );
                if !engine.classifier.was_discovered(&component.path) {
                    engine.registry.remove(&component.path);
                }
            } else {
                errors.lock().unwrap().push(DiscoveryError::Parse {
                    path: component.path.clone(),
                    source: anyhow::anyhow!(parse_err.message),
                });
            }
        }
    }
}

fn reclassify(engine: &Engine, component: &std::sync::Arc<Component>) {
    let files_read = component.files_read();
    let relative = relative_display(&component.path, &engine.config.working_dir);
    let ctx = EvalContext {
        path: &component.path,
        relative_path: relative,
        kind: component.kind,
        external: component.is_external(),
        files_read: Some(&files_read),
    };

    let (status, reason, graph_index) =
        engine
            .classifier
            .classify(&engine.filters, &ctx, ParseAvailability::Available);

    match status {
        ClassificationStatus::Discovered => {
            engine.classifier.mark_discovered(component.path.clone());
        }
        ClassificationStatus::Excluded => {
            engine.registry.remove(&component.path);
        }
        ClassificationStatus::Candidate => {
            if reason == ClassificationReason::GraphTarget
                && let Some(idx) = graph_index
            {
                engine.classifier.claim_graph(idx, component.path.clone());
            }
        }
    }
}
