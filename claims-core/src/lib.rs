pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod postgres;
pub mod storage;

// Re-export commonly used types
pub use classify::classify_document;
pub use config::{AssistantConfig, MessagingConfig, Settings, TrackerConfig};
pub use error::{CoreError, Result};
pub use models::{
    CaseStatus, CaseUpdate, Document, DocumentType, DocumentUpdate, NewDocument, NewReport,
    NewSurgeryCase, NewUser, Report, SurgeryCase, User, UserUpdate,
};
pub use postgres::PostgresCaseStore;
pub use storage::{CaseStore, InMemoryCaseStore};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_case(phone: &str) -> NewSurgeryCase {
        NewSurgeryCase {
            patient_name: "Maria Souza".to_string(),
            patient_cpf: "123.456.789-00".to_string(),
            patient_phone: phone.to_string(),
            surgery_type: "Artroscopia de joelho".to_string(),
            surgery_date: Utc::now(),
            doctor_name: "Dr. Lima".to_string(),
            hospital_name: "Hospital Santa Clara".to_string(),
            insurance_company: "Unimed".to_string(),
            status: CaseStatus::Pending,
            reimbursement_amount: 0.0,
        }
    }

    fn sample_document(name: &str) -> NewDocument {
        NewDocument {
            document_type: DocumentType::Guide,
            file_name: name.to_string(),
            file_path: format!("/uploads/{name}"),
            file_size: 2048,
            mime_type: "application/pdf".to_string(),
            extracted_text: None,
            is_processed: false,
            is_valid: true,
            validation_notes: None,
        }
    }

    #[tokio::test]
    async fn case_round_trips_with_nested_documents() {
        let store = InMemoryCaseStore::new();
        let case = store.create_case(sample_case("5511999990000")).await.unwrap();

        for i in 0..3 {
            store
                .add_document(case.id, sample_document(&format!("doc{i}.pdf")))
                .await
                .unwrap();
        }

        let fetched = store.get_case(case.id).await.unwrap().unwrap();
        assert_eq!(fetched.documents.len(), 3);
        assert_eq!(fetched.documents[0].file_name, "doc0.pdf");
        assert_eq!(fetched.documents[0].mime_type, "application/pdf");
        assert_eq!(fetched.patient_name, "Maria Souza");
    }

    #[tokio::test]
    async fn deleting_a_case_cascades_to_documents() {
        let store = InMemoryCaseStore::new();
        let case = store.create_case(sample_case("5511999990000")).await.unwrap();
        let document = store
            .add_document(case.id, sample_document("guia.pdf"))
            .await
            .unwrap();

        store.delete_case(case.id).await.unwrap();

        assert!(store.get_case(case.id).await.unwrap().is_none());
        assert!(store.get_document(document.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_case_for_phone_picks_most_recent() {
        let store = InMemoryCaseStore::new();
        let phone = "5511988887777";
        store.create_case(sample_case(phone)).await.unwrap();
        let mut second = sample_case(phone);
        second.surgery_type = "Rinoplastia".to_string();
        let latest = store.create_case(second).await.unwrap();
        store.create_case(sample_case("other")).await.unwrap();

        let found = store.latest_case_for_phone(phone).await.unwrap().unwrap();
        assert_eq!(found.id, latest.id);
        assert_eq!(found.surgery_type, "Rinoplastia");

        assert!(store.latest_case_for_phone("none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tracker_task_reference_is_resolvable() {
        let store = InMemoryCaseStore::new();
        let case = store.create_case(sample_case("5511999990000")).await.unwrap();

        store
            .set_tracker_task(case.id, "task-123".to_string())
            .await
            .unwrap();

        let found = store.case_by_tracker_task("task-123").await.unwrap().unwrap();
        assert_eq!(found.id, case.id);
        assert!(store.case_by_tracker_task("task-999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_can_be_set_directly() {
        let store = InMemoryCaseStore::new();
        let case = store.create_case(sample_case("5511999990000")).await.unwrap();

        let updated = store
            .set_case_status(case.id, CaseStatus::Approved)
            .await
            .unwrap();
        assert_eq!(updated.status, CaseStatus::Approved);

        let err = store.set_case_status(9999, CaseStatus::Rejected).await;
        assert!(matches!(err, Err(CoreError::NotFound(_))));
    }
}
