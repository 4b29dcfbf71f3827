use crate::cli::EventsArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::events::{generate_event_files, EventsRequest};

pub fn execute(args: EventsArgs) -> i32 {
    let root = match params::bids_root(&args.ids) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let raw_dir = match params::existing_dir(&args.raw_dir, "Behavioral data folder") {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    if let Some(session) = args.session {
        if session == 0 || session > args.session_count {
            eprintln!(
                "Error: Session {} is outside 1..={}",
                session, args.session_count
            );
            return exit_codes::INPUT_ERROR;
        }
    }
    let study = match params::load_study(&args.study) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let request = EventsRequest {
        bids_root: root,
        raw_dir,
        participant: params::participant(&args.ids),
        session: args.session,
        session_count: args.session_count,
        study,
    };
    let report = match generate_event_files(&request) {
        Ok(r) => r,
        Err(e) => return params::fail(e),
    };

    let exit_code = if report.skipped.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::PARTIAL_FAILURE
    };

    if args.report.wants_json() {
        let code = output::emit_json(&report, &args.report);
        return if code == exit_codes::SUCCESS { exit_code } else { code };
    }
    if !args.report.quiet {
        for path in &report.written {
            eprintln!("  wrote {}", path.display());
        }
        for path in &report.subsequent_updated {
            eprintln!("  subsequent memory added to {}", path.display());
        }
        for task in &report.skipped {
            eprintln!("Warning: task {} was not coded", task);
        }
        eprintln!(
            "{}: {} events file(s) written",
            request.participant.label(),
            report.written.len()
        );
    }
    exit_code
}
