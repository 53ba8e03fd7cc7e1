//! System prompts for the employee and HR assistants.

use sakina_core::models::{AnalysisLog, CheckIn, HrSummary, Language};

const EMPLOYEE_BASE_EN: &str = "You are Sakina, a warm and supportive wellbeing companion for \
employees. Listen carefully, answer briefly and kindly, and never give medical diagnoses. \
If the employee seems to be in distress, gently suggest reaching out to their HR partner \
or a professional counsellor.";

const EMPLOYEE_BASE_AR: &str = "أنت سكينة، رفيق داعم ودافئ لرفاهية الموظفين. استمع بعناية، \
وأجب باختصار ولطف، ولا تقدم تشخيصات طبية. إذا بدا أن الموظف يمر بضائقة، اقترح عليه بلطف \
التواصل مع شريك الموارد البشرية أو مستشار مختص. أجب باللغة العربية.";

const HR_BASE_EN: &str = "You are Sakina's HR assistant. You help HR managers understand team \
wellbeing trends using only the aggregate data below. Never guess at individual identities \
and keep recommendations practical.";

const HR_BASE_AR: &str = "أنت مساعد الموارد البشرية في سكينة. تساعد مديري الموارد البشرية على \
فهم اتجاهات رفاهية الفرق باستخدام البيانات المجمعة أدناه فقط. لا تخمّن هويات الأفراد واجعل \
توصياتك عملية. أجب باللغة العربية.";

pub fn employee_base(language: Language) -> &'static str {
    match language {
        Language::En => EMPLOYEE_BASE_EN,
        Language::Ar => EMPLOYEE_BASE_AR,
    }
}

pub fn hr_base(language: Language) -> &'static str {
    match language {
        Language::En => HR_BASE_EN,
        Language::Ar => HR_BASE_AR,
    }
}

/// Short description of the employee's latest check-in, or `None` when
/// there is nothing to say.
pub fn checkin_context(checkin: Option<&CheckIn>, analysis: Option<&AnalysisLog>) -> Option<String> {
    let checkin = checkin?;
    let mut lines = vec![format!("- Last mood score: {}/5", checkin.mood_score)];

    if let Some(note) = checkin.note_text.as_deref().filter(|n| !n.trim().is_empty()) {
        lines.push(format!("- Last note: \"{}\"", note.trim()));
    }
    if let Some(analysis) = analysis {
        lines.push(format!("- Risk level: {}", analysis.risk_level));
        if let Some(sentiment) = analysis.sentiment {
            lines.push(format!("- Sentiment: {}", sentiment.as_str()));
        }
    }

    Some(format!("Latest check-in:\n{}", lines.join("\n")))
}

pub fn employee_system_prompt(language: Language, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("{}\n\n{}", employee_base(language), context),
        None => employee_base(language).to_string(),
    }
}

pub fn hr_system_prompt(language: Language, summary: &HrSummary) -> String {
    let data = serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string());
    format!("{}\n\nCurrent wellbeing summary (JSON):\n{}", hr_base(language), data)
}
