use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::tools::{ALL_TOOLS, DEFAULT_TOOL_PATHS};
use afniprep_rs::Suite;
use serde::Serialize;

#[derive(Serialize)]
struct ToolInfo {
    program: &'static str,
    suite: Suite,
    description: &'static str,
    path: Option<String>,
    found: bool,
}

#[derive(Serialize)]
struct InfoOutput {
    cli_version: String,
    platform: String,
    arch: String,
    tools: Vec<ToolInfo>,
    search_paths: Vec<&'static str>,
}

pub fn execute(args: InfoArgs) -> i32 {
    let toolbox = params::resolve_toolbox(&args.tools);

    let tools = ALL_TOOLS
        .iter()
        .map(|&tool| {
            let found = toolbox.is_resolved(tool);
            ToolInfo {
                program: tool.program(),
                suite: tool.suite(),
                description: tool.description(),
                path: found.then(|| toolbox.program(tool).display().to_string()),
                found,
            }
        })
        .collect();

    let info = InfoOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        tools,
        search_paths: DEFAULT_TOOL_PATHS.to_vec(),
    };

    if args.json {
        match output::to_json(&info, false) {
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
        println!("afniprep CLI v{}", info.cli_version);
        println!("Platform: {} ({})", info.platform, info.arch);
        println!();
        println!("  {:<28} {:<10} {}", "Program", "Found", "Path");
        println!("  {}", "-".repeat(64));
        for t in &info.tools {
            println!(
                "  {:<28} {:<10} {}",
                t.program,
                if t.found { "yes" } else { "no" },
                t.path.as_deref().unwrap_or("-")
            );
        }
        println!();
        println!(
            "Search paths: $AFNI_HOME, $DCM2NIIX_PATH, $WORKBENCH_DIR, $PATH, {}",
            info.search_paths.join(", ")
        );
    }

    exit_codes::SUCCESS
}
