use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Processing status of a reimbursement case.
///
/// No transition table is enforced: any caller may set any of the five
/// values directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    #[default]
    Pending,
    InAnalysis,
    Approved,
    Rejected,
    Completed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InAnalysis => "in_analysis",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_analysis" => Ok(Self::InAnalysis),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            other => Err(CoreError::InvalidField(format!(
                "unknown case status: {other}"
            ))),
        }
    }
}

/// Fixed vocabulary of document type tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Guide,
    Cnh,
    InsuranceCard,
    MedicalReport,
    MedicalRecord,
    #[default]
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guide => "guide",
            Self::Cnh => "cnh",
            Self::InsuranceCard => "insurance_card",
            Self::MedicalReport => "medical_report",
            Self::MedicalRecord => "medical_record",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "guide" => Ok(Self::Guide),
            "cnh" => Ok(Self::Cnh),
            "insurance_card" => Ok(Self::InsuranceCard),
            "medical_report" => Ok(Self::MedicalReport),
            "medical_record" => Ok(Self::MedicalRecord),
            "other" => Ok(Self::Other),
            other => Err(CoreError::InvalidField(format!(
                "unknown document type: {other}"
            ))),
        }
    }
}

/// One patient's reimbursement claim, with its attached documents nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeryCase {
    pub id: i64,
    pub patient_name: String,
    pub patient_cpf: String,
    pub patient_phone: String,
    pub surgery_type: String,
    pub surgery_date: DateTime<Utc>,
    pub doctor_name: String,
    pub hospital_name: String,
    pub insurance_company: String,
    pub status: CaseStatus,
    pub reimbursement_amount: f64,
    /// Opaque identifier of the mirrored task in the external tracker.
    pub tracker_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSurgeryCase {
    pub patient_name: String,
    pub patient_cpf: String,
    pub patient_phone: String,
    pub surgery_type: String,
    pub surgery_date: DateTime<Utc>,
    pub doctor_name: String,
    pub hospital_name: String,
    pub insurance_company: String,
    #[serde(default)]
    pub status: CaseStatus,
    #[serde(default)]
    pub reimbursement_amount: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseUpdate {
    pub patient_name: Option<String>,
    pub patient_cpf: Option<String>,
    pub patient_phone: Option<String>,
    pub surgery_type: Option<String>,
    pub surgery_date: Option<DateTime<Utc>>,
    pub doctor_name: Option<String>,
    pub hospital_name: Option<String>,
    pub insurance_company: Option<String>,
    pub status: Option<CaseStatus>,
    pub reimbursement_amount: Option<f64>,
}

/// A stored file attached to a surgery case. Lifecycle follows the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub case_id: i64,
    pub document_type: DocumentType,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub extracted_text: Option<String>,
    pub is_processed: bool,
    pub is_valid: bool,
    pub validation_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document_type: DocumentType,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub extracted_text: Option<String>,
    pub is_processed: bool,
    pub is_valid: bool,
    pub validation_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentUpdate {
    pub document_type: Option<DocumentType>,
    pub file_name: Option<String>,
    pub extracted_text: Option<String>,
    pub is_processed: Option<bool>,
    pub is_valid: Option<bool>,
    pub validation_notes: Option<String>,
}

/// Informational output; no relation to other entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub report_type: String,
    pub title: String,
    pub content: String,
    pub data: Option<serde_json::Value>,
    /// User id or "system".
    pub generated_by: String,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReport {
    pub report_type: String,
    pub title: String,
    pub content: String,
    pub data: Option<serde_json::Value>,
    pub generated_by: String,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_status_round_trips_through_wire_form() {
        for status in [
            CaseStatus::Pending,
            CaseStatus::InAnalysis,
            CaseStatus::Approved,
            CaseStatus::Rejected,
            CaseStatus::Completed,
        ] {
            let parsed: CaseStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("archived".parse::<CaseStatus>().is_err());
    }

    #[test]
    fn case_status_serializes_snake_case() {
        let json = serde_json::to_string(&CaseStatus::InAnalysis).unwrap();
        assert_eq!(json, "\"in_analysis\"");
        let back: CaseStatus = serde_json::from_str("\"in_analysis\"").unwrap();
        assert_eq!(back, CaseStatus::InAnalysis);
    }

    #[test]
    fn document_type_wire_form() {
        assert_eq!(DocumentType::InsuranceCard.as_str(), "insurance_card");
        assert_eq!(
            "medical_report".parse::<DocumentType>().unwrap(),
            DocumentType::MedicalReport
        );
    }
}
