use crate::models::Context;

const MAX_PROMPT_ACTIVITIES: usize = 10;

/// Plain-text rendering of a context for a recommendation client.
pub fn render_prompt(context: &Context) -> String {
    let mut out = String::from("Current user context:\n\n");

    if let Some(app) = &context.main_application {
        out.push_str(&format!("Currently working in: {app}\n\n"));
    }
    out.push_str(&format!("Summary: {}\n\n", context.summary));
    out.push_str(&format!("Keywords: {}\n\n", context.keywords.join(", ")));

    out.push_str("Recent activities:\n");
    for activity in context.activities.iter().take(MAX_PROMPT_ACTIVITIES) {
        let time = activity
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S");
        match activity.text() {
            Some(text) => out.push_str(&format!("- {time} [{}] - {text}\n", activity.application)),
            None => out.push_str(&format!("- {time} [{}]\n", activity.application)),
        }
    }
    out
}
