use crate::models::AppealPackage;

pub const ARTIFACT_FILE_NAME: &str = "appeal-letter.txt";
pub const ARTIFACT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const HEADER: &str = "PRIOR AUTHORIZATION APPEAL LETTER";

/// Render an appeal package as the plain-text document users download
pub fn assemble(package: &AppealPackage) -> String {
    let instructions = package
        .submission_instructions
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{HEADER}\n\n{letter}\n\n---\n\nSUBMISSION INSTRUCTIONS:\n{instructions}\n\nREQUIRED DOCUMENTS:\n{documents}\n\nIMPORTANT: {reminder}\n\nADDITIONAL TIPS:\n{tips}\n",
        letter = package.appeal_letter,
        documents = bullets(&package.documents_to_include),
        reminder = package.deadline_reminder,
        tips = bullets(&package.additional_tips),
    )
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
