use std::path::PathBuf;
use std::process::exit;

use clap::{arg, command, Command};
use log::warn;
use rayon::prelude::*;

use markscan::debug::ImageDebugWriter;
use markscan::key::KeyFile;
use markscan::session::{EvalSession, ProcessSheetError, SheetEvaluation};
use markscan::store::{JsonlStore, ResultStore};
use markscan::types::StudentId;

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let matches = cli().get_matches();
    let debug = matches.get_flag("debug");
    let key_path = matches
        .get_one::<String>("key")
        .expect("answer key path is required");
    let choices = *matches
        .get_one::<u32>("choices")
        .expect("choices has a default");
    let student = matches.get_one::<String>("student");
    let results_path = matches.get_one::<String>("results");
    let sheet_paths = matches
        .get_many::<String>("sheets")
        .expect("at least one sheet image is required")
        .map(PathBuf::from)
        .collect::<Vec<PathBuf>>();

    let key_json = match std::fs::read_to_string(key_path) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error reading answer key: {}", e);
            exit(1);
        }
    };

    let key_file: KeyFile = match serde_json::from_str(&key_json) {
        Ok(key_file) => key_file,
        Err(e) => {
            eprintln!("Error parsing answer key: {}", e);
            exit(1);
        }
    };

    let layout = key_file.derive_layout(choices);
    let session = EvalSession::from_columns(&key_file.subjects, layout);

    // Sheets are independent units of work; evaluate them in parallel and
    // report in input order.
    let evaluations = sheet_paths
        .par_iter()
        .map(|path| {
            let debug_writer = if debug {
                ImageDebugWriter::new(path.clone())
            } else {
                ImageDebugWriter::disabled()
            };
            session.process_sheet_path(path, &debug_writer)
        })
        .collect::<Vec<Result<SheetEvaluation, ProcessSheetError>>>();

    let mut store = results_path.map(JsonlStore::new);
    let mut failures = 0;
    for (index, (path, result)) in sheet_paths.iter().zip(evaluations).enumerate() {
        match result {
            Ok(evaluation) => {
                let name = student_name(student, index, sheet_paths.len());
                print_result(&name, &session, &evaluation);
                if let Some(store) = store.as_mut() {
                    let student_id = StudentId::from(name);
                    if let Err(e) =
                        store.save(&student_id, &evaluation.report, session.subject_names())
                    {
                        warn!("failed to save result for {}: {:?}", student_id, e);
                    }
                }
            }
            Err(e) => {
                eprintln!("Error processing {}: {:?}", path.display(), e);
                failures += 1;
            }
        }
    }

    if failures == sheet_paths.len() {
        exit(1);
    }
}

/// Mirrors the upload flow's naming: an explicit name (suffixed when the
/// batch has several sheets) or a generated `Student_<n>`.
fn student_name(given: Option<&String>, index: usize, total: usize) -> String {
    match given {
        Some(name) if total > 1 => format!("{}_{}", name, index + 1),
        Some(name) => name.clone(),
        None => format!("Student_{}", index + 1),
    }
}

fn print_result(name: &str, session: &EvalSession, evaluation: &SheetEvaluation) {
    let subjects = session
        .subject_names()
        .iter()
        .zip(&evaluation.report.per_subject)
        .map(|(subject, correct)| serde_json::json!({ "name": subject, "correct": correct }))
        .collect::<Vec<serde_json::Value>>();
    let record = serde_json::json!({
        "student": name,
        "subjects": subjects,
        "total": evaluation.report.total,
        "diagnostics": evaluation.diagnostics,
    });
    println!("{}", record);
}

#[allow(clippy::cognitive_complexity)]
fn cli() -> Command {
    command!()
        .arg(arg!(-k --key <PATH> "Path to answer key JSON file").required(true))
        .arg(
            arg!(-c --choices <N> "Choices per question")
                .value_parser(clap::value_parser!(u32))
                .default_value("4"),
        )
        .arg(arg!(-s --student <NAME> "Student name used for printed and saved results"))
        .arg(arg!(-r --results <PATH> "Append results to this JSON-lines file"))
        .arg(arg!(-d --debug "Write intermediate debug images next to each sheet"))
        .arg(arg!(sheets: <SHEET_IMAGE> ... "Paths to sheet images").required(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_number_from_one() {
        assert_eq!(student_name(None, 0, 3), "Student_1");
        assert_eq!(student_name(None, 2, 3), "Student_3");
    }

    #[test]
    fn explicit_names_suffix_only_in_batches() {
        let name = "jordan".to_string();
        assert_eq!(student_name(Some(&name), 0, 1), "jordan");
        assert_eq!(student_name(Some(&name), 1, 2), "jordan_2");
    }

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }
}
