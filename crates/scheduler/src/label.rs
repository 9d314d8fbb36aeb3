// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline label templates

use dv_core::{EnvironmentVariables, PipelineInstance};
use regex::Regex;
use std::sync::LazyLock;

/// Regex pattern for ${COUNT} and ${ENV:NAME} placeholders
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(?i:(COUNT)|ENV:([A-Za-z_][A-Za-z0-9_]*))\}")
        .expect("constant regex pattern is valid")
});

/// Render a label template.
///
/// `${COUNT}` becomes the pipeline counter and `${ENV:NAME}` the value of
/// `NAME` in `vars` (empty when undefined). Other text is kept as-is.
pub fn render_label(template: &str, counter: u32, vars: &EnvironmentVariables) -> String {
    LABEL_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            if caps.get(1).is_some() {
                counter.to_string()
            } else {
                vars.get(&caps[2]).unwrap_or_default().to_string()
            }
        })
        .to_string()
}

/// Assign the pipeline's counter and re-render its label.
pub fn update_counter(pipeline: &mut PipelineInstance, counter: u32) {
    pipeline.counter = counter;
    pipeline.label =
        render_label(&pipeline.label_template, counter, &pipeline.environment_variables);
}

#[cfg(test)]
#[path = "label_tests.rs"]
mod tests;
