use crate::cli::GlmsArgs;
use crate::commands::roi::measure;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::roi::pipeline::glm_conditions;
use afniprep_rs::roi::{list_glms, list_subjects, Measure};
use afniprep_rs::{SystemRunner, Tool};
use serde::Serialize;

#[derive(Serialize)]
struct GlmEntry {
    glm: String,
    measure: Measure,
    #[serde(skip_serializing_if = "Option::is_none")]
    conditions: Option<Vec<String>>,
}

#[derive(Serialize)]
struct GlmsOutput {
    subjects: Vec<String>,
    glms: Vec<GlmEntry>,
}

pub async fn execute(args: GlmsArgs) -> i32 {
    let subject_results = match params::existing_dir(&args.subject_results, "subject_results folder") {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let subjects = match list_subjects(&subject_results, args.subjects.as_deref()) {
        Ok(s) => s,
        Err(e) => return params::fail(e),
    };
    if subjects.is_empty() {
        eprintln!(
            "Error: No subject folders in {}",
            subject_results.display()
        );
        return exit_codes::INPUT_ERROR;
    }

    let toolbox = if args.conditions {
        match params::require_tools(&args.tools, &[Tool::ThreeDInfo]) {
            Ok(t) => Some(t),
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return exit_codes::TOOL_NOT_FOUND;
            }
        }
    } else {
        None
    };

    let measures = match args.measure {
        Some(m) => vec![measure(m)],
        None => vec![Measure::Magnitudes, Measure::Timecourses],
    };

    let runner = SystemRunner::new();
    let mut glms = Vec::new();
    for m in measures {
        let names = match list_glms(&subjects, m.glm_kind()) {
            Ok(n) => n,
            Err(e) => return params::fail(e),
        };
        for glm in names {
            let conditions = match toolbox {
                Some(ref toolbox) => match glm_conditions(&runner, toolbox, &subjects, &glm, m).await {
                    Ok(c) => Some(c),
                    Err(e) => return params::fail(e),
                },
                None => None,
            };
            glms.push(GlmEntry {
                glm,
                measure: m,
                conditions,
            });
        }
    }

    let result = GlmsOutput {
        subjects: subjects.iter().map(|s| s.id.clone()).collect(),
        glms,
    };

    if args.json {
        match output::to_json(&result, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        println!("Subjects: {}", result.subjects.join(", "));
        println!();
        println!("  {:<32} {:<12}", "GLM", "Measure");
        println!("  {}", "-".repeat(44));
        for entry in &result.glms {
            println!("  {:<32} {:<12}", entry.glm, entry.measure.as_str());
            if let Some(ref conditions) = entry.conditions {
                for condition in conditions {
                    println!("      {}", condition);
                }
            }
        }
    }

    exit_codes::SUCCESS
}
