use crate::cli::SetupArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::bids::create_folders;

pub fn execute(args: SetupArgs) -> i32 {
    let root = match params::bids_root(&args.ids) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    if args.sessions.contains(&0) {
        eprintln!("Error: Session numbers start at 1");
        return exit_codes::INPUT_ERROR;
    }

    let participant = params::participant(&args.ids);
    let report = match create_folders(&root, &participant, &args.sessions) {
        Ok(r) => r,
        Err(e) => return params::fail(e),
    };

    if args.report.wants_json() {
        return output::emit_json(&report, &args.report);
    }
    if !args.report.quiet {
        eprintln!(
            "{}: created {} folder(s)",
            report.participant,
            report.created.len()
        );
        for dir in &report.created {
            eprintln!("  {}", dir.display());
        }
    }
    exit_codes::SUCCESS
}
