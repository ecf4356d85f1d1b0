use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::info;

use crate::error::{CoreError, Result};
use crate::models::{
    CaseStatus, CaseUpdate, Document, DocumentUpdate, NewDocument, NewReport, NewSurgeryCase,
    NewUser, Report, SurgeryCase, User, UserUpdate,
};
use crate::storage::CaseStore;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS surgeries (
        id BIGSERIAL PRIMARY KEY,
        patient_name TEXT NOT NULL,
        patient_cpf TEXT NOT NULL,
        patient_phone TEXT NOT NULL,
        surgery_type TEXT NOT NULL,
        surgery_date TIMESTAMPTZ NOT NULL,
        doctor_name TEXT NOT NULL,
        hospital_name TEXT NOT NULL,
        insurance_company TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        reimbursement_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
        tracker_task_id TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id BIGSERIAL PRIMARY KEY,
        surgery_id BIGINT NOT NULL REFERENCES surgeries(id) ON DELETE CASCADE,
        document_type TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_size BIGINT NOT NULL,
        mime_type TEXT NOT NULL,
        extracted_text TEXT,
        is_processed BOOLEAN NOT NULL DEFAULT FALSE,
        is_valid BOOLEAN NOT NULL DEFAULT TRUE,
        validation_notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reports (
        id BIGSERIAL PRIMARY KEY,
        report_type TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        data JSONB,
        generated_by TEXT NOT NULL,
        period_start TIMESTAMPTZ,
        period_end TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL,
        email TEXT NOT NULL
    )
    "#,
];

/// PostgreSQL implementation of CaseStore
pub struct PostgresCaseStore {
    pool: PgPool,
}

impl PostgresCaseStore {
    /// Connects and creates the tables when they do not exist yet.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("connected to PostgreSQL case store");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn documents_of(&self, case_id: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE surgery_id = $1 ORDER BY id")
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn attach_documents(&self, mut case: SurgeryCase) -> Result<SurgeryCase> {
        case.documents = self.documents_of(case.id).await?;
        Ok(case)
    }
}

fn case_from_row(row: &PgRow) -> Result<SurgeryCase> {
    let status: String = row.try_get("status")?;
    Ok(SurgeryCase {
        id: row.try_get("id")?,
        patient_name: row.try_get("patient_name")?,
        patient_cpf: row.try_get("patient_cpf")?,
        patient_phone: row.try_get("patient_phone")?,
        surgery_type: row.try_get("surgery_type")?,
        surgery_date: row.try_get("surgery_date")?,
        doctor_name: row.try_get("doctor_name")?,
        hospital_name: row.try_get("hospital_name")?,
        insurance_company: row.try_get("insurance_company")?,
        status: status.parse()?,
        reimbursement_amount: row.try_get("reimbursement_amount")?,
        tracker_task_id: row.try_get("tracker_task_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        documents: Vec::new(),
    })
}

fn document_from_row(row: &PgRow) -> Result<Document> {
    let document_type: String = row.try_get("document_type")?;
    Ok(Document {
        id: row.try_get("id")?,
        case_id: row.try_get("surgery_id")?,
        document_type: document_type.parse()?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        file_size: row.try_get("file_size")?,
        mime_type: row.try_get("mime_type")?,
        extracted_text: row.try_get("extracted_text")?,
        is_processed: row.try_get("is_processed")?,
        is_valid: row.try_get("is_valid")?,
        validation_notes: row.try_get("validation_notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn report_from_row(row: &PgRow) -> Result<Report> {
    Ok(Report {
        id: row.try_get("id")?,
        report_type: row.try_get("report_type")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        data: row.try_get("data")?,
        generated_by: row.try_get("generated_by")?,
        period_start: row.try_get("period_start")?,
        period_end: row.try_get("period_end")?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
    })
}

fn missing(entity: &str, id: i64) -> CoreError {
    CoreError::NotFound(format!("{entity} {id}"))
}

#[async_trait]
impl CaseStore for PostgresCaseStore {
    async fn create_case(&self, new: NewSurgeryCase) -> Result<SurgeryCase> {
        let row = sqlx::query(
            "INSERT INTO surgeries (patient_name, patient_cpf, patient_phone, surgery_type, \
             surgery_date, doctor_name, hospital_name, insurance_company, status, \
             reimbursement_amount) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(&new.patient_name)
        .bind(&new.patient_cpf)
        .bind(&new.patient_phone)
        .bind(&new.surgery_type)
        .bind(new.surgery_date)
        .bind(&new.doctor_name)
        .bind(&new.hospital_name)
        .bind(&new.insurance_company)
        .bind(new.status.as_str())
        .bind(new.reimbursement_amount)
        .fetch_one(&self.pool)
        .await?;
        case_from_row(&row)
    }

    async fn get_case(&self, id: i64) -> Result<Option<SurgeryCase>> {
        let row = sqlx::query("SELECT * FROM surgeries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.attach_documents(case_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn list_cases(&self) -> Result<Vec<SurgeryCase>> {
        let case_rows = sqlx::query("SELECT * FROM surgeries ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let document_rows = sqlx::query("SELECT * FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut by_case: HashMap<i64, Vec<Document>> = HashMap::new();
        for row in &document_rows {
            let document = document_from_row(row)?;
            by_case.entry(document.case_id).or_default().push(document);
        }

        case_rows
            .iter()
            .map(|row| {
                let mut case = case_from_row(row)?;
                case.documents = by_case.remove(&case.id).unwrap_or_default();
                Ok(case)
            })
            .collect()
    }

    async fn update_case(&self, id: i64, update: CaseUpdate) -> Result<SurgeryCase> {
        // read-merge-write; the store has no concurrent writers per record
        let current = self.get_case(id).await?.ok_or_else(|| missing("case", id))?;
        let row = sqlx::query(
            "UPDATE surgeries SET patient_name = $1, patient_cpf = $2, patient_phone = $3, \
             surgery_type = $4, surgery_date = $5, doctor_name = $6, hospital_name = $7, \
             insurance_company = $8, status = $9, reimbursement_amount = $10, \
             updated_at = now() WHERE id = $11 RETURNING *",
        )
        .bind(update.patient_name.unwrap_or(current.patient_name))
        .bind(update.patient_cpf.unwrap_or(current.patient_cpf))
        .bind(update.patient_phone.unwrap_or(current.patient_phone))
        .bind(update.surgery_type.unwrap_or(current.surgery_type))
        .bind(update.surgery_date.unwrap_or(current.surgery_date))
        .bind(update.doctor_name.unwrap_or(current.doctor_name))
        .bind(update.hospital_name.unwrap_or(current.hospital_name))
        .bind(update.insurance_company.unwrap_or(current.insurance_company))
        .bind(update.status.unwrap_or(current.status).as_str())
        .bind(
            update
                .reimbursement_amount
                .unwrap_or(current.reimbursement_amount),
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        self.attach_documents(case_from_row(&row)?).await
    }

    async fn set_case_status(&self, id: i64, status: CaseStatus) -> Result<SurgeryCase> {
        let row = sqlx::query(
            "UPDATE surgeries SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| missing("case", id))?;
        self.attach_documents(case_from_row(&row)?).await
    }

    async fn set_tracker_task(&self, id: i64, task_id: String) -> Result<()> {
        let result = sqlx::query(
            "UPDATE surgeries SET tracker_task_id = $1, updated_at = now() WHERE id = $2",
        )
        .bind(&task_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(missing("case", id));
        }
        Ok(())
    }

    async fn delete_case(&self, id: i64) -> Result<()> {
        // documents go with the case via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM surgeries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(missing("case", id));
        }
        Ok(())
    }

    async fn latest_case_for_phone(&self, phone: &str) -> Result<Option<SurgeryCase>> {
        let row = sqlx::query(
            "SELECT * FROM surgeries WHERE patient_phone = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.attach_documents(case_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn case_by_tracker_task(&self, task_id: &str) -> Result<Option<SurgeryCase>> {
        let row = sqlx::query("SELECT * FROM surgeries WHERE tracker_task_id = $1 LIMIT 1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.attach_documents(case_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn add_document(&self, case_id: i64, new: NewDocument) -> Result<Document> {
        let exists = sqlx::query("SELECT id FROM surgeries WHERE id = $1")
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(missing("case", case_id));
        }
        let row = sqlx::query(
            "INSERT INTO documents (surgery_id, document_type, file_name, file_path, file_size, \
             mime_type, extracted_text, is_processed, is_valid, validation_notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(case_id)
        .bind(new.document_type.as_str())
        .bind(&new.file_name)
        .bind(&new.file_path)
        .bind(new.file_size)
        .bind(&new.mime_type)
        .bind(&new.extracted_text)
        .bind(new.is_processed)
        .bind(new.is_valid)
        .bind(&new.validation_notes)
        .fetch_one(&self.pool)
        .await?;
        document_from_row(&row)
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self, case_id: i64) -> Result<Vec<Document>> {
        self.documents_of(case_id).await
    }

    async fn update_document(&self, id: i64, update: DocumentUpdate) -> Result<Document> {
        let current = self
            .get_document(id)
            .await?
            .ok_or_else(|| missing("document", id))?;
        let row = sqlx::query(
            "UPDATE documents SET document_type = $1, file_name = $2, extracted_text = $3, \
             is_processed = $4, is_valid = $5, validation_notes = $6, updated_at = now() \
             WHERE id = $7 RETURNING *",
        )
        .bind(update.document_type.unwrap_or(current.document_type).as_str())
        .bind(update.file_name.unwrap_or(current.file_name))
        .bind(update.extracted_text.or(current.extracted_text))
        .bind(update.is_processed.unwrap_or(current.is_processed))
        .bind(update.is_valid.unwrap_or(current.is_valid))
        .bind(update.validation_notes.or(current.validation_notes))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        document_from_row(&row)
    }

    async fn delete_document(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(missing("document", id));
        }
        Ok(())
    }

    async fn create_report(&self, new: NewReport) -> Result<Report> {
        let row = sqlx::query(
            "INSERT INTO reports (report_type, title, content, data, generated_by, period_start, \
             period_end) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(&new.report_type)
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.data)
        .bind(&new.generated_by)
        .bind(new.period_start)
        .bind(new.period_end)
        .fetch_one(&self.pool)
        .await?;
        report_from_row(&row)
    }

    async fn get_report(&self, id: i64) -> Result<Option<Report>> {
        let row = sqlx::query("SELECT * FROM reports WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(report_from_row).transpose()
    }

    async fn list_reports(&self) -> Result<Vec<Report>> {
        let rows = sqlx::query("SELECT * FROM reports ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(report_from_row).collect()
    }

    async fn delete_report(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(missing("report", id));
        }
        Ok(())
    }

    async fn create_user(&self, new: NewUser) -> Result<User> {
        let row = sqlx::query("INSERT INTO users (username, email) VALUES ($1, $2) RETURNING *")
            .bind(&new.username)
            .bind(&new.email)
            .fetch_one(&self.pool)
            .await?;
        user_from_row(&row)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<User> {
        let current = self.get_user(id).await?.ok_or_else(|| missing("user", id))?;
        let row = sqlx::query("UPDATE users SET username = $1, email = $2 WHERE id = $3 RETURNING *")
            .bind(update.username.unwrap_or(current.username))
            .bind(update.email.unwrap_or(current.email))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        user_from_row(&row)
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(missing("user", id));
        }
        Ok(())
    }
}
