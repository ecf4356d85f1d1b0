use claims_core::CaseStore;
use tracing::{info, warn};

use crate::assistant::Assistant;

/// Keywords that route a message to the status lookup instead of the
/// generative provider.
const STATUS_KEYWORDS: [&str; 4] = ["status", "andamento", "reembolso", "cirurgia"];

pub const NOT_FOUND_REPLY: &str = "Não encontramos nenhuma cirurgia cadastrada para este \
     número. Entre em contato conosco para mais informações.";

pub const FALLBACK_REPLY: &str =
    "Olá! Sou o assistente virtual de reembolso de cirurgias. Como posso ajudá-lo hoje?";

pub const PROCESSING_ERROR_REPLY: &str = "Desculpe, ocorreu um erro ao processar sua mensagem. \
     Tente novamente em alguns minutos.";

pub fn is_status_inquiry(text: &str) -> bool {
    let lowered = text.to_lowercase();
    STATUS_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

/// Forms the reply to one inbound text message.
///
/// Stateless: nothing is persisted between calls, and provider failures
/// never reach the sender — they degrade to the fixed fallback greeting.
pub async fn respond_to_text(
    store: &dyn CaseStore,
    assistant: &dyn Assistant,
    sender: &str,
    text: &str,
) -> String {
    if is_status_inquiry(text) {
        return match store.latest_case_for_phone(sender).await {
            Ok(Some(case)) => format!(
                "Olá! Sua cirurgia de {} está com status: {}.",
                case.surgery_type, case.status
            ),
            Ok(None) => NOT_FOUND_REPLY.to_string(),
            Err(e) => {
                warn!(sender = %sender, error = %e, "status lookup failed");
                PROCESSING_ERROR_REPLY.to_string()
            }
        };
    }

    let intent = assistant.classify_intent(text).await;
    info!(sender = %sender, intent = %intent, "delegating free-form message");

    match assistant.generate_reply(text).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(sender = %sender, error = %e, "assistant reply failed, using fallback");
            FALLBACK_REPLY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::MessageIntent;
    use async_trait::async_trait;
    use chrono::Utc;
    use claims_core::{CaseStatus, InMemoryCaseStore, NewSurgeryCase};

    struct CannedAssistant {
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl Assistant for CannedAssistant {
        async fn generate_reply(&self, _user_message: &str) -> anyhow::Result<String> {
            self.reply
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("provider unavailable"))
        }

        async fn classify_intent(&self, _message: &str) -> MessageIntent {
            MessageIntent::GeneralQuestion
        }
    }

    fn case_for(phone: &str, surgery_type: &str, status: CaseStatus) -> NewSurgeryCase {
        NewSurgeryCase {
            patient_name: "Ana Pereira".to_string(),
            patient_cpf: "987.654.321-00".to_string(),
            patient_phone: phone.to_string(),
            surgery_type: surgery_type.to_string(),
            surgery_date: Utc::now(),
            doctor_name: "Dra. Costa".to_string(),
            hospital_name: "Hospital Central".to_string(),
            insurance_company: "Amil".to_string(),
            status,
            reimbursement_amount: 1500.0,
        }
    }

    #[tokio::test]
    async fn status_keyword_reports_latest_case() {
        let store = InMemoryCaseStore::new();
        let phone = "5511911112222";
        store
            .create_case(case_for(phone, "Catarata", CaseStatus::Pending))
            .await
            .unwrap();
        store
            .create_case(case_for(phone, "Rinoplastia", CaseStatus::InAnalysis))
            .await
            .unwrap();
        let assistant = CannedAssistant { reply: Some("ignored") };

        let reply = respond_to_text(&store, &assistant, phone, "qual o STATUS?").await;
        assert_eq!(
            reply,
            "Olá! Sua cirurgia de Rinoplastia está com status: in_analysis."
        );
    }

    #[tokio::test]
    async fn status_keyword_without_cases_uses_not_found_reply() {
        let store = InMemoryCaseStore::new();
        let assistant = CannedAssistant { reply: Some("ignored") };

        let reply =
            respond_to_text(&store, &assistant, "5511900000000", "andamento do reembolso").await;
        assert_eq!(reply, NOT_FOUND_REPLY);
    }

    #[tokio::test]
    async fn free_form_message_returns_provider_output_verbatim() {
        let store = InMemoryCaseStore::new();
        let assistant = CannedAssistant {
            reply: Some("Você precisa enviar a guia médica e a CNH."),
        };

        let reply = respond_to_text(&store, &assistant, "5511900000000", "quais documentos?").await;
        assert_eq!(reply, "Você precisa enviar a guia médica e a CNH.");
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_fallback_greeting() {
        let store = InMemoryCaseStore::new();
        let assistant = CannedAssistant { reply: None };

        let reply = respond_to_text(&store, &assistant, "5511900000000", "bom dia").await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[test]
    fn keyword_detection_is_case_insensitive() {
        assert!(is_status_inquiry("ANDAMENTO do meu processo"));
        assert!(is_status_inquiry("minha Cirurgia"));
        assert!(!is_status_inquiry("bom dia"));
    }
}
