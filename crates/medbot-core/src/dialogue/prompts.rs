//! Prompts and system instructions sent to the generation collaborator.

pub const EDUCATION_SYSTEM: &str = "You are a hospital health educator. Write a clear, accurate \
patient education leaflet in Traditional Chinese. Use short sections with headings, plain \
language a patient without medical training can follow, and concrete daily-life advice. Do not \
give a diagnosis or prescribe medication.";

pub const PLAIN_LANGUAGE_SYSTEM: &str = "You rewrite what a clinician says into plain, friendly \
Traditional Chinese a patient can understand. Keep every medical instruction. Reply with the \
rewritten text only.";

pub const CHAT_TRANSLATE_SYSTEM: &str = "You are a medical interpreter. Translate faithfully and \
then append one short question, in the same target language, that checks whether the patient \
understood. Reply with the translation and the question only.";

pub fn leaflet(topic: &str) -> String {
    format!("Write a patient education leaflet about: {topic}")
}

/// Composite prompt: the instruction plus the full original leaflet.
pub fn revision(instruction: &str, original: &str) -> String {
    format!(
        "Revise the patient education leaflet below according to this instruction.\n\
         Instruction: {instruction}\n\n\
         Original leaflet:\n{original}\n\n\
         Reply with the complete revised leaflet only."
    )
}

pub fn plain_language(source: &str) -> String {
    format!("Rewrite in plain language:\n{source}")
}

pub fn chat_translation(text: &str, language: &str) -> String {
    format!("Target language: {language}\n\nText:\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_carries_both_parts() {
        let p = revision("emphasize diet", "CONTENT_A");
        assert!(p.contains("emphasize diet"));
        assert!(p.contains("CONTENT_A"));
    }
}
