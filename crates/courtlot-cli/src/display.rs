//! Plain-text summaries of batch runs for the terminal.

use courtlot_core::{Assignment, Outcome, RosterEntry, StatusKind, StatusRecord};
use courtlot_dispatch::{Report, StatusReport, Tally};
use courtlot_host::ApplyRun;

// ── Lottery ──

pub fn print_distribution(assignments: &[Assignment]) {
    for a in assignments {
        println!(
            "{:>4}  {} ({})  {} {} {}:00",
            a.lottery_no,
            a.member.name,
            a.member.id,
            a.target.court.name,
            a.target.date,
            a.target.start_hour
        );
    }
    println!("{} assignments", assignments.len());
}

pub fn print_apply(run: &ApplyRun) {
    for report in &run.reports {
        if let Some(line) = failure_line(report.item.sequence_no, &report.item.member.name, &report.outcome) {
            println!("{line}");
        }
    }
    for (assignment, e) in &run.skipped {
        println!(
            "{:>4}  {}  skipped: {e}",
            assignment.lottery_no, assignment.member.name
        );
    }
    print_tally(&run.tally());
    if !run.skipped.is_empty() {
        println!("skipped: {}", run.skipped.len());
    }
}

// ── Roster ──

pub fn print_results(reports: &[Report<RosterEntry, Option<StatusRecord>>]) {
    for report in reports {
        match &report.outcome {
            Outcome::Success(Some(won)) => println!(
                "{:>4}  {}  won {} {} {}",
                report.item.sequence_no, won.member_name, won.court, won.date, won.time
            ),
            outcome => {
                if let Some(line) =
                    failure_line(report.item.sequence_no, &report.item.member.name, outcome)
                {
                    println!("{line}");
                }
            }
        }
    }
    print_tally(&Tally::of(reports));
}

pub fn print_status(report: &StatusReport) {
    for kind in StatusKind::ALL {
        let records: Vec<&StatusRecord> = report.records_of(kind).collect();
        println!("{kind} ({})", records.len());
        for r in records {
            println!("  {} ({})  {} {} {}", r.member_name, r.member_id, r.court, r.date, r.time);
        }
    }
    for member in &report.login_failed {
        println!("login failed: {} ({})", member.name, member.id);
    }
    for (member, detail) in &report.errors {
        println!("error: {} ({}): {detail}", member.name, member.id);
    }
}

fn failure_line<T>(sequence_no: u32, name: &str, outcome: &Outcome<T>) -> Option<String> {
    match outcome {
        Outcome::Success(_) => None,
        Outcome::LoginFailed => Some(format!("{sequence_no:>4}  {name}  login failed")),
        Outcome::Error(detail) => Some(format!("{sequence_no:>4}  {name}  error: {detail}")),
    }
}

fn print_tally(tally: &Tally) {
    println!(
        "success: {}  login failed: {}  errors: {}",
        tally.success, tally.login_failed, tally.errors
    );
}
