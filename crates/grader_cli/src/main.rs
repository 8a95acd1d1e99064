//! CLI probe for the grading core.
//!
//! # Responsibility
//! - Verify `grader_core` linkage without any host application.
//! - Walk one module through create, soft delete and undo, printing the
//!   settled averages (3.67, then 5.00, then 3.67 again).
//!
//! Usage: `grader_cli [config.json]`. Without a config the run is in memory.

use chrono::NaiveDate;
use grader_core::{
    core_version, Division, Exam, GradebookService, GraderConfig, Module, School,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("grader_core version={}", core_version());
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => GraderConfig::load(path)?,
        None => GraderConfig::default(),
    };
    let service = GradebookService::open(&config)?;

    let school = service.create(
        School::new("Demo School", "Main Street 1", "8000", "Zurich").selected(),
    )?;
    let division = service.create(Division::new(school.id, "Upper School", 2024).selected())?;
    let module = service.create(Module::new(division.id, "Mathematics").selected())?;

    let date = NaiveDate::from_ymd_opt(2024, 6, 1).ok_or("invalid demo date")?;
    service.create(Exam::new(module.id, "Algebra", 5.0, 1.0, date).selected())?;
    let heavy = service.create(Exam::new(module.id, "Geometry", 3.0, 2.0, date).selected())?;
    service.create(Exam::new(module.id, "Practice", 6.0, 1.0, date))?;

    let average = service.current_average(Some(module.id))?;
    println!("module average={:.2}", average.value());

    let token = service.soft_delete(heavy.id)?;
    let average = service.current_average(Some(module.id))?;
    println!("after soft delete module average={:.2}", average.value());

    if let Some(token) = token {
        service.undo_soft_delete(token)?;
    }
    let average = service.current_average(Some(module.id))?;
    println!("after undo module average={:.2}", average.value());

    let overall = service.current_average(None)?;
    println!("overall average={:.2}", overall.value());

    service.shutdown();
    Ok(())
}
