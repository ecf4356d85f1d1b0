use crate::models::DocumentType;

/// Assigns a document type tag from extracted text.
///
/// Rules are ordered and the first match wins; a text matching several
/// rules resolves to the earliest one. Matching is case-insensitive
/// substring presence, defaulting to `Other`.
pub fn classify_document(text: &str) -> DocumentType {
    let text = text.to_lowercase();

    if text.contains("guia") && (text.contains("cirurgia") || text.contains("procedimento")) {
        DocumentType::Guide
    } else if text.contains("carteira nacional de habilitação") || text.contains("cnh") {
        DocumentType::Cnh
    } else if text.contains("relatório médico") || text.contains("laudo") {
        DocumentType::MedicalReport
    } else if text.contains("carteirinha") || text.contains("plano de saúde") {
        DocumentType::InsuranceCard
    } else if text.contains("prontuário") {
        DocumentType::MedicalRecord
    } else {
        DocumentType::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surgery_guide_is_recognized() {
        assert_eq!(
            classify_document("Guia de autorização de cirurgia eletiva"),
            DocumentType::Guide
        );
        assert_eq!(
            classify_document("GUIA para o procedimento ambulatorial"),
            DocumentType::Guide
        );
    }

    #[test]
    fn guide_needs_a_procedure_word() {
        // "guia" alone is not enough to tag a guide
        assert_eq!(classify_document("guia de boas-vindas"), DocumentType::Other);
    }

    #[test]
    fn cnh_is_recognized() {
        assert_eq!(classify_document("Cópia da CNH do paciente"), DocumentType::Cnh);
        assert_eq!(
            classify_document("carteira nacional de habilitação"),
            DocumentType::Cnh
        );
    }

    #[test]
    fn medical_report_and_record() {
        assert_eq!(
            classify_document("Laudo do exame de imagem"),
            DocumentType::MedicalReport
        );
        assert_eq!(
            classify_document("Prontuário do paciente, internação 2024"),
            DocumentType::MedicalRecord
        );
    }

    #[test]
    fn insurance_card_is_recognized() {
        assert_eq!(
            classify_document("Carteirinha do plano de saúde, titular"),
            DocumentType::InsuranceCard
        );
    }

    #[test]
    fn unknown_text_defaults_to_other() {
        assert_eq!(classify_document("nota fiscal avulsa"), DocumentType::Other);
        assert_eq!(classify_document(""), DocumentType::Other);
    }

    #[test]
    fn rule_order_is_significant() {
        // matches both the guide rule and the cnh rule; the guide rule is
        // evaluated first
        assert_eq!(
            classify_document("guia de cirurgia anexada à cnh"),
            DocumentType::Guide
        );
    }
}
