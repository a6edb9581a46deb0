use admissions_etl::constants::{DEFAULT_MERGE_PROCEDURE, DEFAULT_STAGING_TABLE, FACT_TABLE};
use admissions_etl::infra::memory::InMemoryWarehouse;
use admissions_etl::infra::sqlite_warehouse::SqliteWarehouse;
use admissions_etl::pipeline::Pipeline;
use anyhow::Result;
use std::sync::Arc;
use tempfile::tempdir;

const HEADER: &str = "Name,Age,Gender,Blood Type,Medical Condition,Date of Admission,Doctor,Hospital,Insurance Provider,Billing Amount,Room Number,Admission Type,Discharge Date,Medication,Test Results";

fn csv(rows: &[&str]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}

fn memory_pipeline() -> (Arc<InMemoryWarehouse>, Pipeline) {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let pipeline = Pipeline::new(warehouse.clone(), warehouse.clone(), DEFAULT_STAGING_TABLE);
    (warehouse, pipeline)
}

#[tokio::test]
async fn test_age_variants_merge_into_one_row() -> Result<()> {
    let (warehouse, pipeline) = memory_pipeline();
    let input = csv(&[
        "Jane Doe,40,Female,A+,Asthma,01/15/2024,Dr. Smith,City Hospital,Aetna,$500.00,101,Urgent,01/20/2024,Aspirin,Normal",
        "Jane Doe,35,Female,A+,Asthma,01/15/2024,Dr. Smith,City Hospital,Aetna,$500.00,101,Urgent,01/20/2024,Aspirin,Normal",
        "Mark Lee,52,Male,B-,Arthritis,03/02/2024,Dr. Jones,General Clinic,Cigna,$75.10,312,Elective,03/04/2024,Ibuprofen,Abnormal",
    ]);

    let outcome = pipeline.run(input.as_bytes()).await;
    assert!(outcome.ok, "{}", outcome.message);
    assert_eq!(outcome.message, "2 records loaded");

    let staged = warehouse.staged(DEFAULT_STAGING_TABLE);
    assert_eq!(staged.len(), 2);
    assert_eq!(staged[0].age, Some(35));

    let a = staged[0].source_admission_id.clone().unwrap();
    let b = staged[1].source_admission_id.clone().unwrap();
    assert_eq!(a.len(), 64);
    assert_eq!(b.len(), 64);
    assert_ne!(a, b);

    let report = outcome.report.unwrap();
    assert_eq!(report.dedup.age_consolidated, 1);
    assert_eq!(report.dedup.exact_duplicates_removed, 0);
    Ok(())
}

#[tokio::test]
async fn test_all_rows_missing_name_halts_before_staging() -> Result<()> {
    let (warehouse, pipeline) = memory_pipeline();
    let rows: Vec<String> = (1..=5)
        .map(|i| format!(",3{i},Male,O+,Cancer,02/0{i}/2024,Dr. Brown,Mercy Hospital,Medicare,$10,10{i},Urgent,,Aspirin,Normal"))
        .collect();
    let refs: Vec<&str> = rows.iter().map(String::as_str).collect();

    let outcome = pipeline.run(csv(&refs).as_bytes()).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.message, "no valid data");
    assert_eq!(warehouse.replace_calls(), 0);
    assert_eq!(warehouse.merge_calls(), 0);
    assert_eq!(outcome.report.unwrap().clean.dropped_missing_required, 5);
    Ok(())
}

#[test]
fn test_bad_billing_keeps_row_and_bad_admission_date_drops_it() -> Result<()> {
    let input = csv(&[
        "Ann Fox,30,Female,O-,Obesity,04/10/2024,Dr. Kim,City Hospital,Aetna,\"$1,234.50\",200,Urgent,04/12/2024,Aspirin,Normal",
        "Bob Ray,41,Male,A-,Diabetes,05/01/2024,Dr. Kim,City Hospital,Aetna,abc,201,Urgent,05/03/2024,Aspirin,Normal",
        "Cal Ito,55,Male,AB+,Cancer,13/40/2024,Dr. Kim,City Hospital,Aetna,$20,202,Urgent,,Aspirin,Normal",
    ]);

    let prepared = Pipeline::prepare(input.as_bytes())?;

    assert_eq!(prepared.records.len(), 2);
    assert_eq!(prepared.records[0].billing_amount, Some(1234.50));
    assert_eq!(prepared.records[1].name, "Bob Ray");
    assert_eq!(prepared.records[1].billing_amount, None);
    assert_eq!(prepared.report.clean.dropped_missing_required, 1);
    assert!(prepared.records.iter().all(|r| r.name != "Cal Ito"));
    Ok(())
}

#[test]
fn test_keys_are_stable_across_batches() -> Result<()> {
    let first = csv(&[
        "Ann Fox,30,Female,O-,Obesity,04/10/2024,Dr. Kim,City Hospital,Aetna,$10,200,Urgent,04/12/2024,Aspirin,Normal",
    ]);
    // Same key fields, different everything else, with padding the cleaner trims
    let second = csv(&[
        "Zed Ng,70,Male,B+,Cancer,06/01/2024,Dr. Roe,Mercy Clinic,Cigna,$99,300,Elective,06/02/2024,Lipitor,Abnormal",
        " Ann Fox ,31,Female,A+, Obesity ,04/10/2024, Dr. Kim ,City Hospital,Medicare,$4000,999,Emergency,,Penicillin,Inconclusive",
    ]);

    let a = Pipeline::prepare(first.as_bytes())?;
    let b = Pipeline::prepare(second.as_bytes())?;

    assert_eq!(
        a.records[0].source_admission_id,
        b.records[1].source_admission_id
    );
    assert_ne!(
        b.records[0].source_admission_id,
        b.records[1].source_admission_id
    );
    Ok(())
}

#[test]
fn test_missing_required_column_fails_prepare() {
    let input = "Name,Age\nJane,40\n";
    let err = Pipeline::prepare(input.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("Date_of_Admission"));
}

#[tokio::test]
async fn test_sqlite_end_to_end_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("warehouse.db");
    let warehouse = Arc::new(SqliteWarehouse::open(
        &db_path,
        DEFAULT_STAGING_TABLE,
        DEFAULT_MERGE_PROCEDURE,
    )?);
    let pipeline = Pipeline::new(warehouse.clone(), warehouse.clone(), DEFAULT_STAGING_TABLE);

    let batch_one = csv(&[
        "Ann Fox,30,Female,O-,Obesity,04/10/2024,Dr. Kim,City Hospital,Aetna,$10,200,Urgent,04/12/2024,Aspirin,Normal",
        "Bob Ray,41,Male,A-,Diabetes,05/01/2024,Dr. Kim,City Hospital,Aetna,$20,201,Urgent,05/03/2024,Aspirin,Normal",
    ]);
    let batch_two = csv(&[
        "Bob Ray,41,Male,A-,Diabetes,05/01/2024,Dr. Kim,City Hospital,Aetna,$25,201,Urgent,05/03/2024,Aspirin,Normal",
        "Cy Tan,19,Male,O+,Cancer,05/09/2024,Dr. Lo,Mercy Clinic,Cigna,$30,202,Elective,05/10/2024,Aspirin,Normal",
    ]);

    let first = pipeline.run(batch_one.as_bytes()).await;
    assert!(first.ok, "{}", first.message);
    let second = pipeline.run(batch_two.as_bytes()).await;
    assert!(second.ok, "{}", second.message);
    // Replaying a batch changes nothing
    let replay = pipeline.run(batch_two.as_bytes()).await;
    assert!(replay.ok, "{}", replay.message);

    assert_eq!(warehouse.count_rows(DEFAULT_STAGING_TABLE)?, 2);
    assert_eq!(warehouse.count_rows(FACT_TABLE)?, 3);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_rejects_nothing_on_empty_batch() -> Result<()> {
    let dir = tempdir()?;
    let warehouse = Arc::new(SqliteWarehouse::open(
        dir.path().join("wh.db"),
        DEFAULT_STAGING_TABLE,
        DEFAULT_MERGE_PROCEDURE,
    )?);
    let pipeline = Pipeline::new(warehouse.clone(), warehouse.clone(), DEFAULT_STAGING_TABLE);

    let seeded = pipeline
        .run(csv(&["Ann Fox,30,Female,O-,Obesity,04/10/2024,Dr. Kim,City Hospital,Aetna,$10,200,Urgent,04/12/2024,Aspirin,Normal"]).as_bytes())
        .await;
    assert!(seeded.ok);

    let empty = pipeline.run(csv(&[]).as_bytes()).await;
    assert!(!empty.ok);
    assert_eq!(empty.message, "no valid data");
    // Previous staging contents are untouched
    assert_eq!(warehouse.count_rows(DEFAULT_STAGING_TABLE)?, 1);
    Ok(())
}

#[tokio::test]
async fn test_exact_duplicates_then_min_age_in_one_group() -> Result<()> {
    let (warehouse, pipeline) = memory_pipeline();
    let input = csv(&[
        "Jane Doe,40,Female,A+,Asthma,01/15/2024,Dr. Smith,City Hospital,Aetna,$500.00,101,Urgent,01/20/2024,Aspirin,Normal",
        "Jane Doe,40,Female,A+,Asthma,01/15/2024,Dr. Smith,City Hospital,Aetna,$500.00,101,Urgent,01/20/2024,Aspirin,Normal",
        "Jane Doe,35,Female,A+,Asthma,01/15/2024,Dr. Smith,City Hospital,Aetna,$500.00,101,Urgent,01/20/2024,Aspirin,Normal",
    ]);

    let outcome = pipeline.run(input.as_bytes()).await;
    assert!(outcome.ok, "{}", outcome.message);
    assert_eq!(outcome.message, "1 records loaded");

    let report = outcome.report.unwrap();
    assert_eq!(report.dedup.exact_duplicates_removed, 1);
    assert_eq!(report.dedup.age_consolidated, 1);

    let staged = warehouse.staged(DEFAULT_STAGING_TABLE);
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].age, Some(35));
    Ok(())
}

#[tokio::test]
async fn test_staging_destination_must_match_merge_source() -> Result<()> {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let pipeline = Pipeline::new(warehouse.clone(), warehouse.clone(), "Staging_Other");
    let input = csv(&[
        "Ann Fox,30,Female,O-,Obesity,04/10/2024,Dr. Kim,City Hospital,Aetna,$10,200,Urgent,04/12/2024,Aspirin,Normal",
    ]);

    let outcome = pipeline.run(input.as_bytes()).await;

    assert!(!outcome.ok);
    assert!(outcome.message.contains("Staging_Other"), "{}", outcome.message);
    assert_eq!(warehouse.merge_calls(), 0);
    assert!(warehouse.staged("Staging_Other").is_empty());
    assert!(warehouse.facts().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_rejects_mismatched_staging_destination() -> Result<()> {
    let dir = tempdir()?;
    let warehouse = Arc::new(SqliteWarehouse::open(
        dir.path().join("wh.db"),
        DEFAULT_STAGING_TABLE,
        DEFAULT_MERGE_PROCEDURE,
    )?);
    let pipeline = Pipeline::new(warehouse.clone(), warehouse.clone(), "Staging_Other");

    let outcome = pipeline
        .run(csv(&["Ann Fox,30,Female,O-,Obesity,04/10/2024,Dr. Kim,City Hospital,Aetna,$10,200,Urgent,04/12/2024,Aspirin,Normal"]).as_bytes())
        .await;

    assert!(!outcome.ok);
    assert_eq!(warehouse.count_rows(FACT_TABLE)?, 0);
    Ok(())
}

#[test]
fn test_two_digit_year_admission_is_dropped() -> Result<()> {
    let input = csv(&[
        "Ann Fox,30,Female,O-,Obesity,04/10/24,Dr. Kim,City Hospital,Aetna,$10,200,Urgent,04/12/2024,Aspirin,Normal",
        "Bob Ray,41,Male,A-,Diabetes,05/01/2024,Dr. Kim,City Hospital,Aetna,$20,201,Urgent,05/03/24,Aspirin,Normal",
    ]);

    let prepared = Pipeline::prepare(input.as_bytes())?;

    assert_eq!(prepared.records.len(), 1);
    assert_eq!(prepared.records[0].name, "Bob Ray");
    assert_eq!(prepared.records[0].discharge_date, None);
    assert_eq!(prepared.report.clean.dropped_missing_required, 1);
    Ok(())
}
