use std::process::ExitCode;

use adjfem_core::QuantityRegistry;
use adjfem_io::{
    load_case, save_case, verify_case, write_json_report, write_text_report, CaseFile,
    VerificationReport,
};
use env_logger::Env;
use log::error;

fn usage() {
    eprintln!("usage: adjfem verify <case.json> [--report <out.json>] [--text <out.txt>]");
    eprintln!("       adjfem template <case.json>");
    eprintln!("       adjfem quantities [--json]");
}

struct VerifyArgs {
    case: String,
    report: Option<String>,
    text: Option<String>,
}

fn parse_verify_args(args: &[String]) -> Option<VerifyArgs> {
    let (case, rest) = args.split_first()?;
    let mut parsed = VerifyArgs {
        case: case.clone(),
        report: None,
        text: None,
    };
    let mut iter = rest.iter();
    while let Some(flag) = iter.next() {
        let value = iter.next()?.clone();
        match flag.as_str() {
            "--report" => parsed.report = Some(value),
            "--text" => parsed.text = Some(value),
            _ => return None,
        }
    }
    Some(parsed)
}

fn write_reports(report: &VerificationReport, args: &VerifyArgs) -> adjfem_io::Result<()> {
    if let Some(path) = &args.report {
        write_json_report(path, report)?;
        println!("wrote {path}");
    }
    if let Some(path) = &args.text {
        write_text_report(path, report)?;
        println!("wrote {path}");
    }
    Ok(())
}

fn run_verify(args: &VerifyArgs) -> ExitCode {
    let case = match load_case(&args.case) {
        Ok(case) => case,
        Err(err) => {
            error!("failed to load {}: {err}", args.case);
            return ExitCode::from(1);
        }
    };
    let mut report = match verify_case(&case) {
        Ok(report) => report,
        Err(err) => {
            error!("verification error: {err}");
            return ExitCode::from(1);
        }
    };
    report.generated_at = Some(chrono::Utc::now().to_rfc3339());

    print!("{}", report.to_text());
    if let Err(err) = write_reports(&report, args) {
        error!("failed to write report: {err}");
        return ExitCode::from(1);
    }
    if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn run_template(path: &str) -> ExitCode {
    match save_case(path, &CaseFile::template()) {
        Ok(()) => {
            println!("wrote {path}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("failed to write {path}: {err}");
            ExitCode::from(1)
        }
    }
}

fn run_quantities(json: bool) -> ExitCode {
    let registry = QuantityRegistry::with_builtin();
    if json {
        let entries: Vec<serde_json::Value> = registry
            .iter()
            .map(|(tag, info)| {
                serde_json::json!({
                    "tag": tag,
                    "name": info.name,
                    "description": info.description,
                })
            })
            .collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                error!("failed to encode quantities: {err}");
                return ExitCode::from(1);
            }
        }
    } else {
        for (tag, info) in registry.iter() {
            println!("{:>5}  {:<24} {}", tag.0, info.name, info.description);
        }
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("verify") => match parse_verify_args(&args[2..]) {
            Some(verify) => run_verify(&verify),
            None => {
                usage();
                ExitCode::from(2)
            }
        },
        Some("template") if args.len() == 3 => run_template(&args[2]),
        Some("quantities") if args.len() == 2 => run_quantities(false),
        Some("quantities") if args.len() == 3 && args[2] == "--json" => run_quantities(true),
        _ => {
            usage();
            ExitCode::from(2)
        }
    }
}
