use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{CoreError, Result};
use crate::models::{
    CaseStatus, CaseUpdate, Document, DocumentUpdate, NewDocument, NewReport, NewSurgeryCase,
    NewUser, Report, SurgeryCase, User, UserUpdate,
};

/// Record store for cases, documents, reports and users.
///
/// `get_case` returns the case with its documents nested; `delete_case`
/// cascades to them.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn create_case(&self, new: NewSurgeryCase) -> Result<SurgeryCase>;
    async fn get_case(&self, id: i64) -> Result<Option<SurgeryCase>>;
    async fn list_cases(&self) -> Result<Vec<SurgeryCase>>;
    async fn update_case(&self, id: i64, update: CaseUpdate) -> Result<SurgeryCase>;
    async fn set_case_status(&self, id: i64, status: CaseStatus) -> Result<SurgeryCase>;
    async fn set_tracker_task(&self, id: i64, task_id: String) -> Result<()>;
    async fn delete_case(&self, id: i64) -> Result<()>;
    /// Most-recently-created case registered under the given phone number.
    async fn latest_case_for_phone(&self, phone: &str) -> Result<Option<SurgeryCase>>;
    async fn case_by_tracker_task(&self, task_id: &str) -> Result<Option<SurgeryCase>>;

    async fn add_document(&self, case_id: i64, new: NewDocument) -> Result<Document>;
    async fn get_document(&self, id: i64) -> Result<Option<Document>>;
    async fn list_documents(&self, case_id: i64) -> Result<Vec<Document>>;
    async fn update_document(&self, id: i64, update: DocumentUpdate) -> Result<Document>;
    async fn delete_document(&self, id: i64) -> Result<()>;

    async fn create_report(&self, new: NewReport) -> Result<Report>;
    async fn get_report(&self, id: i64) -> Result<Option<Report>>;
    async fn list_reports(&self) -> Result<Vec<Report>>;
    async fn delete_report(&self, id: i64) -> Result<()>;

    async fn create_user(&self, new: NewUser) -> Result<User>;
    async fn get_user(&self, id: i64) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<User>;
    async fn delete_user(&self, id: i64) -> Result<()>;
}

/// In-memory implementation of CaseStore
///
/// Used when no DATABASE_URL is configured, and as the test double.
pub struct InMemoryCaseStore {
    cases: DashMap<i64, SurgeryCase>,
    documents: DashMap<i64, Document>,
    reports: DashMap<i64, Report>,
    users: DashMap<i64, User>,
    case_ids: AtomicI64,
    document_ids: AtomicI64,
    report_ids: AtomicI64,
    user_ids: AtomicI64,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self {
            cases: DashMap::new(),
            documents: DashMap::new(),
            reports: DashMap::new(),
            users: DashMap::new(),
            case_ids: AtomicI64::new(1),
            document_ids: AtomicI64::new(1),
            report_ids: AtomicI64::new(1),
            user_ids: AtomicI64::new(1),
        }
    }

    fn documents_of(&self, case_id: i64) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| entry.value().case_id == case_id)
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by_key(|d| d.id);
        docs
    }

    fn with_documents(&self, mut case: SurgeryCase) -> SurgeryCase {
        case.documents = self.documents_of(case.id);
        case
    }
}

impl Default for InMemoryCaseStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(entity: &str, id: i64) -> CoreError {
    CoreError::NotFound(format!("{entity} {id}"))
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn create_case(&self, new: NewSurgeryCase) -> Result<SurgeryCase> {
        let id = self.case_ids.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let case = SurgeryCase {
            id,
            patient_name: new.patient_name,
            patient_cpf: new.patient_cpf,
            patient_phone: new.patient_phone,
            surgery_type: new.surgery_type,
            surgery_date: new.surgery_date,
            doctor_name: new.doctor_name,
            hospital_name: new.hospital_name,
            insurance_company: new.insurance_company,
            status: new.status,
            reimbursement_amount: new.reimbursement_amount,
            tracker_task_id: None,
            created_at: now,
            updated_at: now,
            documents: Vec::new(),
        };
        self.cases.insert(id, case.clone());
        Ok(case)
    }

    async fn get_case(&self, id: i64) -> Result<Option<SurgeryCase>> {
        Ok(self
            .cases
            .get(&id)
            .map(|entry| self.with_documents(entry.value().clone())))
    }

    async fn list_cases(&self) -> Result<Vec<SurgeryCase>> {
        let mut cases: Vec<SurgeryCase> = self
            .cases
            .iter()
            .map(|entry| self.with_documents(entry.value().clone()))
            .collect();
        cases.sort_by_key(|c| c.id);
        Ok(cases)
    }

    async fn update_case(&self, id: i64, update: CaseUpdate) -> Result<SurgeryCase> {
        let mut entry = self.cases.get_mut(&id).ok_or_else(|| missing("case", id))?;
        let case = entry.value_mut();
        if let Some(v) = update.patient_name {
            case.patient_name = v;
        }
        if let Some(v) = update.patient_cpf {
            case.patient_cpf = v;
        }
        if let Some(v) = update.patient_phone {
            case.patient_phone = v;
        }
        if let Some(v) = update.surgery_type {
            case.surgery_type = v;
        }
        if let Some(v) = update.surgery_date {
            case.surgery_date = v;
        }
        if let Some(v) = update.doctor_name {
            case.doctor_name = v;
        }
        if let Some(v) = update.hospital_name {
            case.hospital_name = v;
        }
        if let Some(v) = update.insurance_company {
            case.insurance_company = v;
        }
        if let Some(v) = update.status {
            case.status = v;
        }
        if let Some(v) = update.reimbursement_amount {
            case.reimbursement_amount = v;
        }
        case.updated_at = Utc::now();
        let updated = case.clone();
        drop(entry);
        Ok(self.with_documents(updated))
    }

    async fn set_case_status(&self, id: i64, status: CaseStatus) -> Result<SurgeryCase> {
        self.update_case(
            id,
            CaseUpdate {
                status: Some(status),
                ..CaseUpdate::default()
            },
        )
        .await
    }

    async fn set_tracker_task(&self, id: i64, task_id: String) -> Result<()> {
        let mut entry = self.cases.get_mut(&id).ok_or_else(|| missing("case", id))?;
        entry.value_mut().tracker_task_id = Some(task_id);
        entry.value_mut().updated_at = Utc::now();
        Ok(())
    }

    async fn delete_case(&self, id: i64) -> Result<()> {
        self.cases.remove(&id).ok_or_else(|| missing("case", id))?;
        self.documents.retain(|_, doc| doc.case_id != id);
        Ok(())
    }

    async fn latest_case_for_phone(&self, phone: &str) -> Result<Option<SurgeryCase>> {
        let latest = self
            .cases
            .iter()
            .filter(|entry| entry.value().patient_phone == phone)
            .map(|entry| entry.value().clone())
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(latest.map(|case| self.with_documents(case)))
    }

    async fn case_by_tracker_task(&self, task_id: &str) -> Result<Option<SurgeryCase>> {
        let found = self
            .cases
            .iter()
            .find(|entry| entry.value().tracker_task_id.as_deref() == Some(task_id))
            .map(|entry| entry.value().clone());
        Ok(found.map(|case| self.with_documents(case)))
    }

    async fn add_document(&self, case_id: i64, new: NewDocument) -> Result<Document> {
        if !self.cases.contains_key(&case_id) {
            return Err(missing("case", case_id));
        }
        let id = self.document_ids.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let document = Document {
            id,
            case_id,
            document_type: new.document_type,
            file_name: new.file_name,
            file_path: new.file_path,
            file_size: new.file_size,
            mime_type: new.mime_type,
            extracted_text: new.extracted_text,
            is_processed: new.is_processed,
            is_valid: new.is_valid,
            validation_notes: new.validation_notes,
            created_at: now,
            updated_at: now,
        };
        self.documents.insert(id, document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        Ok(self.documents.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_documents(&self, case_id: i64) -> Result<Vec<Document>> {
        Ok(self.documents_of(case_id))
    }

    async fn update_document(&self, id: i64, update: DocumentUpdate) -> Result<Document> {
        let mut entry = self
            .documents
            .get_mut(&id)
            .ok_or_else(|| missing("document", id))?;
        let doc = entry.value_mut();
        if let Some(v) = update.document_type {
            doc.document_type = v;
        }
        if let Some(v) = update.file_name {
            doc.file_name = v;
        }
        if let Some(v) = update.extracted_text {
            doc.extracted_text = Some(v);
        }
        if let Some(v) = update.is_processed {
            doc.is_processed = v;
        }
        if let Some(v) = update.is_valid {
            doc.is_valid = v;
        }
        if let Some(v) = update.validation_notes {
            doc.validation_notes = Some(v);
        }
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    async fn delete_document(&self, id: i64) -> Result<()> {
        self.documents
            .remove(&id)
            .ok_or_else(|| missing("document", id))?;
        Ok(())
    }

    async fn create_report(&self, new: NewReport) -> Result<Report> {
        let id = self.report_ids.fetch_add(1, Ordering::SeqCst);
        let report = Report {
            id,
            report_type: new.report_type,
            title: new.title,
            content: new.content,
            data: new.data,
            generated_by: new.generated_by,
            period_start: new.period_start,
            period_end: new.period_end,
            created_at: Utc::now(),
        };
        self.reports.insert(id, report.clone());
        Ok(report)
    }

    async fn get_report(&self, id: i64) -> Result<Option<Report>> {
        Ok(self.reports.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_reports(&self) -> Result<Vec<Report>> {
        let mut reports: Vec<Report> =
            self.reports.iter().map(|entry| entry.value().clone()).collect();
        reports.sort_by_key(|r| r.id);
        Ok(reports)
    }

    async fn delete_report(&self, id: i64) -> Result<()> {
        self.reports
            .remove(&id)
            .ok_or_else(|| missing("report", id))?;
        Ok(())
    }

    async fn create_user(&self, new: NewUser) -> Result<User> {
        let id = self.user_ids.fetch_add(1, Ordering::SeqCst);
        let user = User {
            id,
            username: new.username,
            email: new.email,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<User> {
        let mut entry = self.users.get_mut(&id).ok_or_else(|| missing("user", id))?;
        let user = entry.value_mut();
        if let Some(v) = update.username {
            user.username = v;
        }
        if let Some(v) = update.email {
            user.email = v;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        self.users.remove(&id).ok_or_else(|| missing("user", id))?;
        Ok(())
    }
}
