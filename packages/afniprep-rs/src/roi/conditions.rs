//! GLM condition names and condition selection.

use std::path::Path;

use crate::error::{AfniPrepError, Result};
use crate::runner::{Invocation, ToolRunner};
use crate::tools::{Tool, Toolbox};

/// Suffix AFNI gives the coefficient sub-brick of each regressor
pub const COEF_SUFFIX: &str = "#0_Coef";

/// Coefficient sub-brick labels (`hit#0_Coef`) from `3dinfo -label` output
pub fn coef_labels(label_output: &str) -> Vec<String> {
    label_output
        .split('|')
        .map(str::trim)
        .filter(|l| l.contains(COEF_SUFFIX))
        .map(str::to_string)
        .collect()
}

/// Condition names of a GAM stats dataset (`hit#0_Coef` → `hit`)
pub fn parse_coef_labels(label_output: &str) -> Vec<String> {
    coef_labels(label_output)
        .iter()
        .map(|l| condition_from_label(l).to_string())
        .collect()
}

pub fn condition_from_label(label: &str) -> &str {
    label.strip_suffix(COEF_SUFFIX).unwrap_or(label)
}

/// Condition of a TENT impulse-response dataset (`iresp.hit.101+tlrc.HEAD` → `hit`)
pub fn tent_condition(file_name: &str) -> &str {
    let base = file_name.strip_suffix(".HEAD").unwrap_or(file_name);
    let base = base.strip_suffix("+tlrc").unwrap_or(base);
    let rest = base.strip_prefix("iresp.").unwrap_or(base);
    rest.split('.').next().unwrap_or(rest)
}

/// Longest substring (over two characters) of the first item shared by every item.
///
/// Ties go to the earliest occurrence in the first item; fewer than two items yield `""`.
pub fn longest_common_substring(items: &[String]) -> String {
    let Some(first) = items.first() else {
        return String::new();
    };
    if items.len() < 2 {
        return String::new();
    }

    let chars: Vec<char> = first.chars().collect();
    let mut best = String::new();
    for start in 0..chars.len() {
        for end in (start + 1)..=chars.len() {
            let len = end - start;
            if len <= best.chars().count() || len <= 2 {
                continue;
            }
            let candidate: String = chars[start..end].iter().collect();
            if items.iter().all(|s| s.contains(&candidate)) {
                best = candidate;
            }
        }
    }
    best
}

/// Strip shared substrings from condition names for display and selection.
///
/// Five rounds of removing the longest common substring, re-sorting after each.
pub fn shorten_conditions(conditions: &[String]) -> Vec<String> {
    let mut current: Vec<String> = conditions.to_vec();
    for _ in 0..5 {
        let common = longest_common_substring(&current);
        if !common.is_empty() {
            current = current.iter().map(|c| c.replace(&common, "")).collect();
        }
        current.sort();
    }
    current
}

/// Whether `option` belongs to the chosen condition.
///
/// It must contain `chosen`, and no other shortened condition may also appear in it unless
/// that condition is itself part of `chosen` (so `hit` does not pick up `hit-cr_GLT`).
pub fn select_unique(option: &str, chosen: &str, shortened: &[String]) -> bool {
    if !option.contains(chosen) {
        return false;
    }
    shortened
        .iter()
        .filter(|other| other.as_str() != chosen)
        .all(|other| !option.contains(other.as_str()) || chosen.contains(other.as_str()))
}

/// Options matching any chosen condition, in option order; `None` keeps all options.
pub fn select_options(options: &[String], chosen: Option<&[String]>, shortened: &[String]) -> Vec<String> {
    match chosen {
        None => options.to_vec(),
        Some(chosen) => options
            .iter()
            .filter(|option| chosen.iter().any(|c| select_unique(option, c, shortened)))
            .cloned()
            .collect(),
    }
}

/// Coefficient labels of a stats dataset, via `3dinfo -label`.
pub async fn stats_coef_labels<R: ToolRunner>(runner: &R, toolbox: &Toolbox, dataset: &Path) -> Result<Vec<String>> {
    let inv = Invocation::new(toolbox, Tool::ThreeDInfo)
        .arg("-label")
        .path_arg(dataset);
    let output = runner.run(&inv).await?;
    let labels = coef_labels(&output.stdout);
    if labels.is_empty() {
        return Err(AfniPrepError::ParseError(format!(
            "{}: no '{}' sub-brick labels",
            dataset.display(),
            COEF_SUFFIX
        )));
    }
    Ok(labels)
}
