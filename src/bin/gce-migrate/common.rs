use gce_migrate::migrate::{BatchReport, MigrationFailure, MigrationRequest, Outcome};

pub fn print_table<const N: usize>(headers: &[&str; N], rows: &[[String; N]]) {
    let mut widths = [0usize; N];
    for (i, h) in headers.iter().enumerate() {
        widths[i] = widths[i].max(display_width(h));
    }
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    for (i, h) in headers.iter().enumerate() {
        if i > 0 {
            print!("  ");
        }
        print!("{:width$}", h, width = widths[i]);
    }
    println!();

    for (i, w) in widths.iter().enumerate() {
        if i > 0 {
            print!("  ");
        }
        print!("{}", "-".repeat(*w));
    }
    println!();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                print!("  ");
            }
            print!("{:width$}", cell, width = widths[i]);
        }
        println!();
    }
}

fn display_width(s: &str) -> usize {
    s.chars().count()
}

pub fn request_row(request: &MigrationRequest) -> [String; 4] {
    [
        request.source_zone.clone(),
        request.source_instance.clone(),
        request.machine_type.clone().unwrap_or_else(|| "-".to_string()),
        request.target_instance.clone(),
    ]
}

pub fn print_requests(requests: &[MigrationRequest]) {
    let rows: Vec<[String; 4]> = requests.iter().map(request_row).collect();
    print_table(&["ZONE", "NAME", "MACHINE_TYPE", "TARGET"], &rows);
}

pub fn print_report(report: &BatchReport) {
    let rows: Vec<[String; 4]> = report
        .entries
        .iter()
        .map(|entry| {
            let (status, detail) = match &entry.outcome {
                Outcome::Migrated(migrated) => ("MIGRATED", format!("id {}", migrated.id)),
                Outcome::Failed(failure) => ("FAILED", failure.to_string()),
                Outcome::Skipped => ("SKIPPED", "cancelled".to_string()),
            };
            [
                entry.request.source_instance.clone(),
                entry.request.target_instance.clone(),
                status.to_string(),
                detail,
            ]
        })
        .collect();
    print_table(&["NAME", "TARGET", "STATUS", "DETAIL"], &rows);
}

/// Lists what a failed migration left behind.
pub fn print_leftovers(failure: &MigrationFailure) {
    if failure.created.is_empty() {
        eprintln!("No resources were created.");
        return;
    }
    eprintln!("Resources left in place:");
    for resource in &failure.created {
        eprintln!("  {}", resource);
    }
}
