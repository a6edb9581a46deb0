/// Canonical column names shared by the loader, cleaner, schema and adapters.
/// These are the underscored forms the loader normalizes every header to.

pub const NAME: &str = "Name";
pub const AGE: &str = "Age";
pub const GENDER: &str = "Gender";
pub const BLOOD_TYPE: &str = "Blood_Type";
pub const MEDICAL_CONDITION: &str = "Medical_Condition";
pub const DATE_OF_ADMISSION: &str = "Date_of_Admission";
pub const DOCTOR: &str = "Doctor";
pub const HOSPITAL: &str = "Hospital";
pub const INSURANCE_PROVIDER: &str = "Insurance_Provider";
pub const BILLING_AMOUNT: &str = "Billing_Amount";
pub const ROOM_NUMBER: &str = "Room_Number";
pub const ADMISSION_TYPE: &str = "Admission_Type";
pub const DISCHARGE_DATE: &str = "Discharge_Date";
pub const MEDICATION: &str = "Medication";
pub const TEST_RESULTS: &str = "Test_Results";

// Derived by the keyer, never read from input
pub const SOURCE_ADMISSION_ID: &str = "SourceAdmissionID";

/// The 15 input columns, in the order the generator writes them.
pub const INPUT_COLUMNS: [&str; 15] = [
    NAME,
    AGE,
    GENDER,
    BLOOD_TYPE,
    MEDICAL_CONDITION,
    DATE_OF_ADMISSION,
    DOCTOR,
    HOSPITAL,
    INSURANCE_PROVIDER,
    BILLING_AMOUNT,
    ROOM_NUMBER,
    ADMISSION_TYPE,
    DISCHARGE_DATE,
    MEDICATION,
    TEST_RESULTS,
];

/// Columns whose absence from the header is fatal to a run.
pub const REQUIRED_COLUMNS: [&str; 2] = [NAME, DATE_OF_ADMISSION];

/// External date format for admission and discharge dates.
pub const INPUT_DATE_FORMAT: &str = "%m/%d/%Y";

/// Text form of a parsed date, used for keys and storage.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

pub const KEY_DELIMITER: char = '|';

// Defaults for the bundled warehouse
pub const DEFAULT_STAGING_TABLE: &str = "Staging_Admissions";
pub const DEFAULT_MERGE_PROCEDURE: &str = "sp_LoadDataWarehouse_Incremental";
pub const FACT_TABLE: &str = "Fact_Admissions";

pub const NO_VALID_DATA: &str = "no valid data";

/// Map a header cell to its canonical column name.
///
/// Spaces become underscores and the match is case-insensitive, so
/// "Date of Admission" and "date_of_admission" both resolve.
pub fn canonical_column(header: &str) -> Option<&'static str> {
    let normalized = header.trim().replace(' ', "_");
    INPUT_COLUMNS
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(&normalized))
}
