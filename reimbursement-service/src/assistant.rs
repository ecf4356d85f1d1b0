use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use serde::Deserialize;
use std::fmt;
use tracing::warn;

use claims_core::{AssistantConfig, SurgeryCase};

const COMPLETION_MODEL: &str = "gpt-4o-mini";

const REPLY_PREAMBLE: &str = r#"Você é um assistente virtual de uma empresa especializada em gestão de cirurgias e reembolso.

Suas responsabilidades:
- Ajudar pacientes com dúvidas sobre reembolso de cirurgias
- Orientar sobre documentação necessária
- Fornecer informações sobre status de processos
- Ser sempre cordial, profissional e prestativo

Tipos de documentos necessários:
- Guia médica
- CNH ou RG
- Carteirinha do plano de saúde
- Relatórios médicos
- Laudos

Se o paciente perguntar sobre status, oriente-o a fornecer CPF ou nome completo.
Se precisar de documentos, explique quais são necessários e como enviar.

Mantenha as respostas concisas e úteis."#;

const INTENT_PREAMBLE: &str = r#"Classifique a intenção da mensagem do usuário em uma das categorias:
- status_inquiry: pergunta sobre status do reembolso
- document_submission: envio de documentos
- general_question: pergunta geral sobre processo
- complaint: reclamação ou problema
- greeting: cumprimento ou saudação

Responda apenas com a categoria."#;

const EXTRACT_PREAMBLE: &str = r#"Extraia as seguintes informações da mensagem, se disponíveis:
- Nome completo (patient_name)
- CPF (patient_cpf)
- Telefone (patient_phone)
- Tipo de cirurgia (surgery_type)
- Data da cirurgia (surgery_date)
- Nome do médico (doctor_name)
- Hospital (hospital_name)

Retorne em formato JSON com exatamente essas chaves. Se alguma informação não estiver disponível, use null."#;

const SUMMARY_PREAMBLE: &str = r#"Gere um resumo executivo baseado nos dados de cirurgias fornecidos.
Inclua:
- Total de cirurgias
- Status dos processos
- Valores de reembolso
- Principais insights

Seja conciso e profissional."#;

/// Classified intent of an inbound patient message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageIntent {
    StatusInquiry,
    DocumentSubmission,
    GeneralQuestion,
    Complaint,
    Greeting,
}

impl MessageIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusInquiry => "status_inquiry",
            Self::DocumentSubmission => "document_submission",
            Self::GeneralQuestion => "general_question",
            Self::Complaint => "complaint",
            Self::Greeting => "greeting",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "status_inquiry" => Some(Self::StatusInquiry),
            "document_submission" => Some(Self::DocumentSubmission),
            "general_question" => Some(Self::GeneralQuestion),
            "complaint" => Some(Self::Complaint),
            "greeting" => Some(Self::Greeting),
            _ => None,
        }
    }
}

impl fmt::Display for MessageIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patient fields extracted from free text; absent fields stay None.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PatientInfo {
    pub patient_name: Option<String>,
    pub patient_cpf: Option<String>,
    pub patient_phone: Option<String>,
    pub surgery_type: Option<String>,
    pub surgery_date: Option<String>,
    pub doctor_name: Option<String>,
    pub hospital_name: Option<String>,
}

/// Seam over the generative-text provider so callers can branch on failure
/// explicitly and tests can run without the network.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn generate_reply(&self, user_message: &str) -> anyhow::Result<String>;
    async fn classify_intent(&self, message: &str) -> MessageIntent;
}

/// Generative-text provider client built from explicit configuration.
pub struct AssistantClient {
    config: AssistantConfig,
}

impl AssistantClient {
    pub fn new(config: AssistantConfig) -> Self {
        Self { config }
    }

    fn client(&self) -> openai::Client {
        match &self.config.api_base {
            Some(base) => openai::Client::from_url(&self.config.api_key, base),
            None => openai::Client::new(&self.config.api_key),
        }
    }

    async fn prompt(
        &self,
        preamble: &str,
        temperature: f64,
        max_tokens: u64,
        message: &str,
    ) -> anyhow::Result<String> {
        let agent = self
            .client()
            .agent(COMPLETION_MODEL)
            .preamble(preamble)
            .temperature(temperature)
            .max_tokens(max_tokens)
            .build();
        let response = agent.prompt(message).await?;
        Ok(response.trim().to_string())
    }

    /// Structured extraction of patient fields from a free-text message.
    pub async fn extract_patient_info(&self, message: &str) -> anyhow::Result<PatientInfo> {
        let response = self.prompt(EXTRACT_PREAMBLE, 0.1, 200, message).await?;
        parse_json_object(&response)
    }

    /// Executive summary over the given cases, for stored reports.
    pub async fn summarize_cases(&self, cases: &[SurgeryCase]) -> anyhow::Result<String> {
        let digest = cases
            .iter()
            .map(|case| {
                format!(
                    "- {} | {} | {} | R$ {:.2}",
                    case.patient_name, case.surgery_type, case.status, case.reimbursement_amount
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.prompt(SUMMARY_PREAMBLE, 0.5, 500, &digest).await
    }
}

#[async_trait]
impl Assistant for AssistantClient {
    async fn generate_reply(&self, user_message: &str) -> anyhow::Result<String> {
        self.prompt(REPLY_PREAMBLE, 0.7, 300, user_message).await
    }

    async fn classify_intent(&self, message: &str) -> MessageIntent {
        match self.prompt(INTENT_PREAMBLE, 0.1, 50, message).await {
            Ok(category) => MessageIntent::parse(&category).unwrap_or_else(|| {
                warn!(raw = %category, "unrecognized intent category");
                MessageIntent::GeneralQuestion
            }),
            Err(e) => {
                warn!(error = %e, "intent classification failed");
                MessageIntent::GeneralQuestion
            }
        }
    }
}

/// Completions sometimes wrap JSON in prose; slice out the outermost object
/// before deserializing.
fn parse_json_object(response: &str) -> anyhow::Result<PatientInfo> {
    let sliced = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => response,
    };
    serde_json::from_str(sliced)
        .map_err(|e| anyhow::anyhow!("failed to parse extraction response: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_categories_parse() {
        assert_eq!(
            MessageIntent::parse("status_inquiry"),
            Some(MessageIntent::StatusInquiry)
        );
        assert_eq!(
            MessageIntent::parse("  Greeting\n"),
            Some(MessageIntent::Greeting)
        );
        assert_eq!(MessageIntent::parse("chitchat"), None);
    }

    #[test]
    fn extraction_tolerates_prose_around_json() {
        let raw = r#"Aqui está: {"patient_name": "João Silva", "patient_cpf": null,
            "patient_phone": null, "surgery_type": "catarata", "surgery_date": null,
            "doctor_name": null, "hospital_name": null} espero ter ajudado"#;
        let info = parse_json_object(raw).unwrap();
        assert_eq!(info.patient_name.as_deref(), Some("João Silva"));
        assert_eq!(info.surgery_type.as_deref(), Some("catarata"));
        assert!(info.patient_cpf.is_none());
    }

    #[test]
    fn extraction_rejects_non_json() {
        assert!(parse_json_object("não consegui extrair nada").is_err());
    }
}
