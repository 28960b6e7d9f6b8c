//! Email rendering for newsletter issues.
//!
//! [`render_email`] is a pure function from a payload (plus precomputed
//! enrichment) to email HTML. All user-sourced text is escaped before
//! embedding. Unknown question kinds render as nothing. The unsubscribe
//! URL is embedded verbatim; building it is the dispatcher's job.

pub mod enrich;

use chrono::{Datelike, Utc};

use crate::content::{CodingQuestion, ContentPayload, InterviewFlowQuestion, Question};
use crate::render::enrich::Enrichment;

/// Subject line for every issue.
pub const SUBJECT: &str = "Daily Coding Challenge from learnif.";

/// Plain-text alternative body for clients that refuse HTML.
pub const TEXT_FALLBACK: &str = "View this email in HTML format to see the full content.";

const FONT: &str = "'Epilogue', Arial, sans-serif";

/// Escape text for embedding in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one issue as recipient-addressed email HTML.
pub fn render_email(
    payload: &ContentPayload,
    enrichment: &Enrichment,
    recipient_email: &str,
    unsubscribe_url: &str,
) -> String {
    let questions_html: String = payload
        .questions
        .iter()
        .enumerate()
        .map(|(index, question)| match question {
            Question::Coding(q) => render_coding(q, enrichment.image_for(index)),
            Question::InterviewFlow(q) => render_interview_flow(q),
            Question::Unknown => String::new(),
        })
        .collect();

    let topics_html: String = payload
        .topics
        .iter()
        .map(|topic| {
            format!(
                r#"<li style="margin-bottom: 8px;">{}</li>"#,
                escape_html(topic)
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <meta http-equiv="X-UA-Compatible" content="IE=edge">
  <title>Daily Coding Challenge - learnif.</title>
  <!--[if mso]>
  <style type="text/css">
    body, table, td, a {{ font-family: Arial, sans-serif !important; }}
  </style>
  <![endif]-->
</head>
<body style="margin: 0; padding: 0; background-color: #0a0a0a; font-family: {font};">
  <table role="presentation" cellspacing="0" cellpadding="0" border="0" width="100%" style="background-color: #0a0a0a;">
    <tr>
      <td align="center" style="padding: 24px 16px;">

        <table role="presentation" cellspacing="0" cellpadding="0" border="0" width="100%" style="max-width: 680px; margin: 0 auto;">
          <tr>
            <td align="center" style="padding-bottom: 16px;">
              <span style="font-size: 30px; font-weight: 600; color: #FFFFFF; letter-spacing: -0.5px; font-family: {font};">learnif.</span>
            </td>
          </tr>
        </table>

        <table role="presentation" cellspacing="0" cellpadding="0" border="0" width="100%" style="max-width: 680px; margin: 0 auto; background: rgba(255, 255, 255, 0.05); border-radius: 20px; border: 1px solid rgba(255, 255, 255, 0.15);">
          <tr>
            <td style="padding: 24px 20px 12px;">
              <h1 style="margin: 0; font-size: 30px; font-weight: 600; color: #FFFFFF; font-family: {font}; line-height: 1.35;">{title}</h1>
            </td>
          </tr>
          <tr>
            <td style="padding: 0 20px 12px;">
              <ul style="margin: 0; padding-left: 18px; color: rgba(255, 255, 255, 0.9); font-size: 17px; line-height: 1.75; font-family: {font};">{topics}</ul>
            </td>
          </tr>
          <tr>
            <td style="padding: 0 20px 16px;">
              <p style="margin: 0; font-size: 15px; color: rgba(255, 255, 255, 0.7); font-family: {font};">&#9201;&#65039; {read_time}</p>
            </td>
          </tr>
          <tr>
            <td style="padding: 0 20px;">
              <div style="height: 1px; background-color: rgba(255, 255, 255, 0.15);"></div>
            </td>
          </tr>
          {questions}
          <tr>
            <td style="padding: 16px 20px 0;">
              <div style="height: 1px; background-color: rgba(255, 255, 255, 0.15);"></div>
            </td>
          </tr>
          <tr>
            <td style="padding: 20px 20px 24px;">
              <p style="margin: 0 0 14px 0; font-size: 15px; color: rgba(255, 255, 255, 0.8); line-height: 1.6; font-family: {font}; text-align: center;">Keep pushing your limits. Tomorrow's another challenge.</p>
              <p style="margin: 0; font-size: 13px; color: rgba(255, 255, 255, 0.6); text-align: center; font-family: {font};">Daily coding questions, complete answers, endless growth.</p>
            </td>
          </tr>
        </table>

        <table role="presentation" cellspacing="0" cellpadding="0" border="0" width="100%" style="max-width: 680px; margin: 24px auto 0;">
          <tr>
            <td style="padding: 16px 20px; text-align: center;">
              <p style="margin: 0; font-size: 12px; color: rgba(255, 255, 255, 0.4); font-family: {font};">This email was sent to {recipient} because you subscribed to learnif.</p>
              <p style="margin: 10px 0 0 0;">
                <a href="{unsubscribe}" style="font-size: 12px; color: rgba(255, 255, 255, 0.85); text-decoration: underline; font-family: {font};">Unsubscribe</a>
              </p>
            </td>
          </tr>
          <tr>
            <td align="center" style="padding: 0 16px 16px;">
              <p style="margin: 0; font-size: 12px; color: rgba(255, 255, 255, 0.4); font-family: {font};">&copy; {year} learnif. All rights reserved.</p>
            </td>
          </tr>
        </table>

      </td>
    </tr>
  </table>
</body>
</html>"#,
        font = FONT,
        title = escape_html(&payload.title),
        topics = topics_html,
        read_time = escape_html(&payload.read_time),
        questions = questions_html,
        recipient = escape_html(recipient_email),
        unsubscribe = unsubscribe_url,
        year = Utc::now().year(),
    )
}

fn difficulty_color(difficulty: &str) -> &'static str {
    match difficulty {
        "Easy" => "#4CAF50",
        "Medium" => "#FF9800",
        "Hard" => "#F44336",
        _ => "#FFFFFF",
    }
}

fn render_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| {
            format!(
                r#"<span style="display: inline-block; padding: 4px 12px; margin: 4px 4px 4px 0; background: rgba(255, 255, 255, 0.1); border: 1px solid rgba(255, 255, 255, 0.2); border-radius: 12px; font-size: 12px; color: rgba(255, 255, 255, 0.7); font-family: {}">{}</span>"#,
                FONT,
                escape_html(tag)
            )
        })
        .collect()
}

/// Solution block: a pre-rendered code image when enrichment produced one,
/// otherwise the raw code in a preformatted block.
fn render_solution(solution: &crate::content::Solution, image_url: Option<&str>) -> String {
    let code_html = match image_url {
        Some(url) => format!(
            r#"<img src="{}" alt="Solution code" width="100%" style="display: block; max-width: 100%; border-radius: 8px;">"#,
            url
        ),
        None => format!(
            r#"<pre style="margin: 0; font-size: 14px; color: rgba(255, 255, 255, 0.95); font-family: 'Courier New', monospace; line-height: 1.6; white-space: pre-wrap; word-wrap: break-word;">{}</pre>"#,
            escape_html(&solution.code)
        ),
    };

    format!(
        r#"<tr>
      <td style="padding: 20px 0;">
        <div style="background: rgba(0, 0, 0, 0.3); border-radius: 8px; padding: 18px; border: 1px solid rgba(255, 255, 255, 0.1);">
          <h3 style="margin: 0 0 12px 0; font-size: 18px; font-weight: 600; color: #FFFFFF; font-family: {font};">Solution</h3>
          {code}
          <div style="margin-top: 12px; font-size: 13px; color: rgba(255, 255, 255, 0.75); font-family: {font};">
            <span>Time: {time}</span>
            <span style="margin: 0 15px;">&#8226;</span>
            <span>Space: {space}</span>
          </div>
        </div>
      </td>
    </tr>"#,
        font = FONT,
        code = code_html,
        time = escape_html(&solution.time_complexity),
        space = escape_html(&solution.space_complexity),
    )
}

fn render_coding(question: &CodingQuestion, image_url: Option<&str>) -> String {
    let examples_html: String = question
        .examples
        .iter()
        .enumerate()
        .map(|(index, example)| {
            format!(
                r#"<tr>
      <td style="padding: 8px 0;">
        <strong style="color: rgba(255, 255, 255, 0.9); font-family: {font};">Example {n}:</strong>
        <div style="margin-top: 4px; font-size: 15px; color: rgba(255, 255, 255, 0.85); font-family: 'Courier New', monospace; line-height: 1.6;">
          <div>Input: <span style="color: #4CAF50;">{input}</span></div>
          <div>Output: <span style="color: #4CAF50;">{output}</span></div>
          <div>Explanation: {explanation}</div>
        </div>
      </td>
    </tr>"#,
                font = FONT,
                n = index + 1,
                input = escape_html(&example.input),
                output = escape_html(&example.output),
                explanation = escape_html(&example.explanation),
            )
        })
        .collect();

    let solution_html = question
        .solution
        .as_ref()
        .map(|s| render_solution(s, image_url))
        .unwrap_or_default();

    format!(
        r#"<tr>
    <td style="padding: 20px 20px;">
      <table role="presentation" cellspacing="0" cellpadding="0" border="0" width="100%" style="background: rgba(255, 255, 255, 0.03); border-radius: 16px; border: 1px solid rgba(255, 255, 255, 0.1);">
        <tr>
          <td style="padding: 20px 20px 12px;">
            <h2 style="margin: 0 0 8px 0; font-size: 26px; font-weight: 600; color: #FFFFFF; font-family: {font}; line-height: 1.3;">{title}</h2>
            <div style="margin-bottom: 15px;">
              <span style="display: inline-block; padding: 4px 12px; background: rgba(255, 255, 255, 0.1); border-radius: 12px; font-size: 12px; color: {difficulty_color}; font-weight: 600; font-family: {font};">{difficulty}</span>
            </div>
            <div style="margin-bottom: 15px;">{tags}</div>
          </td>
        </tr>
        <tr>
          <td style="padding: 0 20px 16px;">
            <p style="margin: 0; font-size: 16px; color: rgba(255, 255, 255, 0.88); line-height: 1.7; font-family: {font};">{description}</p>
          </td>
        </tr>
        <tr>
          <td style="padding: 0 20px 16px;">
            <h3 style="margin: 0 0 12px 0; font-size: 18px; font-weight: 600; color: #FFFFFF; font-family: {font};">Examples</h3>
            <table role="presentation" width="100%">{examples}</table>
          </td>
        </tr>
        {solution}
        <tr>
          <td style="padding: 0 25px 25px;"></td>
        </tr>
      </table>
    </td>
  </tr>"#,
        font = FONT,
        title = escape_html(&question.title),
        difficulty_color = difficulty_color(&question.difficulty),
        difficulty = escape_html(&question.difficulty),
        tags = render_tags(&question.tags),
        description = escape_html(&question.description),
        examples = examples_html,
        solution = solution_html,
    )
}

fn render_interview_flow(question: &InterviewFlowQuestion) -> String {
    let dialogue_html: String = question
        .dialogue
        .iter()
        .map(|line| {
            let (background, color) = if line.speaker == "Interviewer" {
                ("rgba(79, 70, 229, 0.1)", "#8B9AFF")
            } else {
                ("rgba(139, 92, 246, 0.1)", "#A78BFA")
            };
            format!(
                r#"<tr>
      <td style="padding: 15px 20px; background: {background};">
        <div style="font-size: 13px; font-weight: 600; color: {color}; margin-bottom: 8px; text-transform: uppercase; letter-spacing: 0.5px; font-family: {font};">{speaker}</div>
        <div style="font-size: 15px; color: rgba(255, 255, 255, 0.85); line-height: 1.7; font-family: {font};">{message}</div>
      </td>
    </tr>"#,
                background = background,
                color = color,
                font = FONT,
                speaker = escape_html(&line.speaker),
                message = escape_html(&line.message),
            )
        })
        .collect();

    format!(
        r#"<tr>
    <td style="padding: 20px 20px;">
      <table role="presentation" cellspacing="0" cellpadding="0" border="0" width="100%" style="background: rgba(255, 255, 255, 0.03); border-radius: 16px; border: 1px solid rgba(255, 255, 255, 0.1);">
        <tr>
          <td style="padding: 20px 20px 12px;">
            <h2 style="margin: 0 0 8px 0; font-size: 26px; font-weight: 600; color: #FFFFFF; font-family: {font}; line-height: 1.3;">{title}</h2>
            <div style="margin-bottom: 15px;">{tags}</div>
          </td>
        </tr>
        <tr>
          <td style="padding: 0 20px 16px;">
            <p style="margin: 0; font-size: 16px; color: rgba(255, 255, 255, 0.88); line-height: 1.7; font-family: {font};">{description}</p>
          </td>
        </tr>
        <tr>
          <td style="padding: 0 0 25px;">
            <table role="presentation" width="100%" cellspacing="0" cellpadding="0">{dialogue}</table>
          </td>
        </tr>
      </table>
    </td>
  </tr>"#,
        font = FONT,
        title = escape_html(&question.title),
        tags = render_tags(&question.tags),
        description = escape_html(&question.description),
        dialogue = dialogue_html,
    )
}
