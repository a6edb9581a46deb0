use crate::constants::{CANONICAL_DATE_FORMAT, KEY_DELIMITER};
use crate::types::AdmissionRecord;
use sha2::{Digest, Sha256};

/// SourceAdmissionID: sha256 over Name|Date_of_Admission|Doctor|Hospital|Medical_Condition.
///
/// Missing text fields contribute an empty string. The same five values
/// always hash to the same key, across batches and runs.
pub fn compute_source_admission_id(record: &AdmissionRecord) -> String {
    let admitted = record
        .date_of_admission
        .format(CANONICAL_DATE_FORMAT)
        .to_string();

    let mut s = String::new();
    s.push_str(&record.name);
    s.push(KEY_DELIMITER);
    s.push_str(&admitted);
    s.push(KEY_DELIMITER);
    if let Some(d) = &record.doctor { s.push_str(d); }
    s.push(KEY_DELIMITER);
    if let Some(h) = &record.hospital { s.push_str(h); }
    s.push(KEY_DELIMITER);
    if let Some(c) = &record.medical_condition { s.push_str(c); }

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}

pub fn assign_keys(records: &mut [AdmissionRecord]) {
    for record in records.iter_mut() {
        record.source_admission_id = Some(compute_source_admission_id(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn admission() -> AdmissionRecord {
        let mut r = AdmissionRecord::new("Jane Doe", NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        r.doctor = Some("Dr. Smith".to_string());
        r.hospital = Some("City Hospital".to_string());
        r.medical_condition = Some("Asthma".to_string());
        r
    }

    #[test]
    fn test_key_matches_known_digest() {
        let expected = hex::encode(Sha256::digest(
            "Jane Doe|2024-01-15|Dr. Smith|City Hospital|Asthma".as_bytes(),
        ));
        assert_eq!(compute_source_admission_id(&admission()), expected);
    }

    #[test]
    fn test_key_is_64_lowercase_hex() {
        let key = compute_source_admission_id(&admission());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_key_ignores_non_key_fields() {
        let a = admission();
        let mut b = admission();
        b.age = Some(99);
        b.billing_amount = Some(12.0);
        b.medication = Some("Aspirin".to_string());
        assert_eq!(compute_source_admission_id(&a), compute_source_admission_id(&b));
    }

    #[test]
    fn test_missing_fields_hash_as_empty() {
        let mut r = admission();
        r.doctor = None;
        r.hospital = None;
        r.medical_condition = None;
        let expected = hex::encode(Sha256::digest("Jane Doe|2024-01-15|||".as_bytes()));
        assert_eq!(compute_source_admission_id(&r), expected);
    }

    #[test]
    fn test_assign_keys_fills_every_record() {
        let mut other = admission();
        other.hospital = Some("Mercy Clinic".to_string());
        let mut batch = vec![admission(), other];
        assign_keys(&mut batch);

        let a = batch[0].source_admission_id.as_deref().unwrap();
        let b = batch[1].source_admission_id.as_deref().unwrap();
        assert_ne!(a, b);
    }
}
