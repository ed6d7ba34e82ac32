//! XML export. There is no XML import.

use tracing::info;

use crate::persistence::Project;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Exports projects as an indented `<Projects>` document without children.
pub fn export_xml(projects: &[Project]) -> String {
    info!("Exporting {} projects as XML", projects.len());

    if projects.is_empty() {
        return "<Projects />".to_string();
    }

    let mut xml = String::from("<Projects>\n");
    for project in projects {
        xml.push_str("  <Project>\n");
        push_element(&mut xml, "Id", &project.id.to_string());
        push_element(&mut xml, "Title", &project.title);
        push_element(&mut xml, "Description", &project.description);
        push_element(&mut xml, "Status", project.status.as_str());
        push_element(&mut xml, "Technology", &project.technology);
        push_element(
            &mut xml,
            "CreatedAt",
            &project.created_at.format(TIMESTAMP_FORMAT).to_string(),
        );
        push_element(&mut xml, "Responsible", &project.responsible);
        xml.push_str("  </Project>\n");
    }
    xml.push_str("</Projects>");
    xml
}

fn push_element(xml: &mut String, name: &str, text: &str) {
    xml.push_str("    <");
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&escape_text(text));
    xml.push_str("</");
    xml.push_str(name);
    xml.push_str(">\n");
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
