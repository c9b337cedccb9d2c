//! Text rendering of the session view and of the final analysis result.

use std::fmt::Write as _;

use docsight_core::status::ResultPayload;
use docsight_tracker::session::{Outcome, SessionPhase};
use docsight_tracker::SessionView;
use tokio::sync::watch;

/// Width of the progress bar in characters.
const BAR_WIDTH: usize = 30;

/// `[#########---------------------]`
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// One status line for the current view.
pub fn render_view(view: &SessionView) -> String {
    let mut line = match (&view.phase, &view.record) {
        (SessionPhase::Uploading, _) => "Uploading document...".to_string(),
        (SessionPhase::NoJob, None) => "No document submitted".to_string(),
        (_, Some(record)) => format!(
            "{} {:>3}%  {}",
            progress_bar(record.progress(), BAR_WIDTH),
            record.percent(),
            record.status().label(),
        ),
        (_, None) => "Waiting for status...".to_string(),
    };

    if view.phase.is_tracking() {
        let indicator = if view.connected {
            "Connected"
        } else {
            "Disconnected"
        };
        let _ = write!(line, "  ({indicator})");
    }
    if let Some(error) = &view.error {
        let _ = write!(line, "  ! {error}");
    }
    line
}

/// Human label for a sentiment score.
pub fn sentiment_label(score: f64) -> &'static str {
    if score > 0.25 {
        "Positive"
    } else if score < -0.25 {
        "Negative"
    } else {
        "Neutral"
    }
}

/// `1234567` -> `1,234,567`
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Multi-line summary of a finished analysis.
pub fn render_result(result: &ResultPayload) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", result.filename);
    if let Some(completed_at) = result.completed_at {
        let _ = writeln!(out, "Processed on {}", completed_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Word count:       {}", group_thousands(result.word_count));
    let _ = writeln!(out, "Processing time:  {:.2}s", result.processing_time_seconds);
    if let Some(score) = result.sentiment_score {
        let _ = writeln!(out, "Sentiment:        {} ({score:.2})", sentiment_label(score));
    }
    if let Some(topics) = result.topics.as_ref().filter(|t| !t.is_empty()) {
        let _ = writeln!(out, "Topics:           {}", topics.join(", "));
    }
    if let Some(error) = &result.error {
        let _ = writeln!(out, "Error:            {error}");
    }

    let _ = writeln!(out);
    if result.key_insights.is_empty() {
        let _ = writeln!(out, "No key insights found.");
    } else {
        let _ = writeln!(out, "Key insights:");
        for insight in &result.key_insights {
            let confidence = (insight.confidence.clamp(0.0, 1.0) * 100.0).round();
            match &insight.category {
                Some(category) => {
                    let _ = writeln!(out, "  - {} [{category}, {confidence}%]", insight.text);
                }
                None => {
                    let _ = writeln!(out, "  - {} [{confidence}%]", insight.text);
                }
            }
        }
    }
    out
}

/// Print a status line every time the view changes, until the session
/// settles or the sender goes away.
pub async fn follow(mut views: watch::Receiver<SessionView>) {
    let mut last = String::new();
    loop {
        let (line, settled) = {
            let view = views.borrow_and_update();
            let settled = matches!(view.phase, SessionPhase::Terminal(_))
                || (view.phase == SessionPhase::NoJob && view.error.is_some());
            (render_view(&view), settled)
        };
        if line != last {
            println!("{line}");
            last = line;
        }
        if settled || views.changed().await.is_err() {
            return;
        }
    }
}

/// Process exit code for a settled session.
pub fn exit_code(view: &SessionView) -> i32 {
    match view.phase {
        SessionPhase::Terminal(Outcome::Complete) => 0,
        _ => 1,
    }
}
