use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One cleaned admission row.
///
/// Serializes with the canonical column names so JSON output lines up with
/// the staging table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Age")]
    pub age: Option<u32>,
    #[serde(rename = "Gender")]
    pub gender: Option<String>,
    #[serde(rename = "Blood_Type")]
    pub blood_type: Option<String>,
    #[serde(rename = "Medical_Condition")]
    pub medical_condition: Option<String>,
    #[serde(rename = "Date_of_Admission")]
    pub date_of_admission: NaiveDate,
    #[serde(rename = "Doctor")]
    pub doctor: Option<String>,
    #[serde(rename = "Hospital")]
    pub hospital: Option<String>,
    #[serde(rename = "Insurance_Provider")]
    pub insurance_provider: Option<String>,
    #[serde(rename = "Billing_Amount")]
    pub billing_amount: Option<f64>,
    #[serde(rename = "Room_Number")]
    pub room_number: Option<String>,
    #[serde(rename = "Admission_Type")]
    pub admission_type: Option<String>,
    #[serde(rename = "Discharge_Date")]
    pub discharge_date: Option<NaiveDate>,
    #[serde(rename = "Medication")]
    pub medication: Option<String>,
    #[serde(rename = "Test_Results")]
    pub test_results: Option<String>,
    /// Business key, filled in by the keyer
    #[serde(rename = "SourceAdmissionID")]
    pub source_admission_id: Option<String>,
}

impl AdmissionRecord {
    /// A record with only the required fields set.
    pub fn new(name: impl Into<String>, date_of_admission: NaiveDate) -> Self {
        Self {
            name: name.into(),
            age: None,
            gender: None,
            blood_type: None,
            medical_condition: None,
            date_of_admission,
            doctor: None,
            hospital: None,
            insurance_provider: None,
            billing_amount: None,
            room_number: None,
            admission_type: None,
            discharge_date: None,
            medication: None,
            test_results: None,
            source_admission_id: None,
        }
    }
}
