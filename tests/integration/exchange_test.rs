//! Import/export integration tests against a real project store.

use digiflow::db::SqliteClient;
use digiflow::exchange::{
    export_projects, import_projects, render_result, ExportFormat, ImportFormat, ResultFormat,
};
use digiflow::persistence::{
    NewProject, NewProposal, NewRequirement, OwnerId, Project, ProjectStatus, ProjectStore,
    ProposalKind,
};
use digiflow::query::{QueryExecutor, QueryLimits, QueryService};
use digiflow::safety::ReadOnlyQueryGuard;
use pretty_assertions::assert_eq;
use std::sync::Arc;

async fn seeded_store(owner: &OwnerId) -> ProjectStore {
    let store = ProjectStore::open_in_memory().await.unwrap();

    let mut intranet = NewProject::new("Intranet relaunch", "Ada")
        .with_description("Portal; search \"everything\"\nsecond line")
        .with_technology("Rust")
        .with_status(ProjectStatus::InProgress);
    intranet
        .requirements
        .push(NewRequirement::new("Single sign-on", "Bob"));
    intranet
        .proposals
        .push(NewProposal::new("Buy a portal", ProposalKind::ThirdParty));
    store.create_project(&intranet, owner).await.unwrap();

    store
        .create_project(
            &NewProject::new("Archive scanning", "Grace").with_status(ProjectStatus::Paused),
            owner,
        )
        .await
        .unwrap();

    store
}

/// Field values that survive every import format.
fn logical_fields(projects: &[Project]) -> Vec<(String, String, ProjectStatus, String, String)> {
    let mut fields: Vec<_> = projects
        .iter()
        .map(|p| {
            (
                p.title.clone(),
                p.description.clone(),
                p.status,
                p.technology.clone(),
                p.responsible.clone(),
            )
        })
        .collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
}

async fn round_trip(format: ImportFormat, export: ExportFormat) {
    let source_owner = OwnerId::new("source");
    let target_owner = OwnerId::new("target");
    let store = seeded_store(&source_owner).await;
    let original = store.list_projects(&source_owner).await.unwrap();

    let exported = export_projects(&original, export).unwrap();
    let imported = import_projects(&exported, format).unwrap();
    let batch: Vec<NewProject> = imported.iter().map(Into::into).collect();
    store
        .create_projects_batch(&batch, &target_owner)
        .await
        .unwrap();

    let copied = store.list_projects(&target_owner).await.unwrap();
    assert_eq!(logical_fields(&copied), logical_fields(&original));
    assert_eq!(store.list_projects(&source_owner).await.unwrap().len(), 2);

    store.close().await;
}

#[tokio::test]
async fn test_json_round_trip_through_store() {
    round_trip(ImportFormat::Json, ExportFormat::Json).await;
}

#[tokio::test]
async fn test_csv_round_trip_through_store() {
    round_trip(ImportFormat::Csv, ExportFormat::Csv).await;
}

#[tokio::test]
async fn test_json_keeps_children() {
    let owner = OwnerId::new("source");
    let store = seeded_store(&owner).await;
    let original = store.list_projects(&owner).await.unwrap();

    let exported = export_projects(&original, ExportFormat::Json).unwrap();
    let imported = import_projects(&exported, ImportFormat::Json).unwrap();
    let intranet = imported
        .iter()
        .find(|p| p.title == "Intranet relaunch")
        .unwrap();

    assert_eq!(intranet.requirements.len(), 1);
    assert_eq!(intranet.requirements[0].title, "Single sign-on");
    assert_eq!(intranet.proposals[0].kind, ProposalKind::ThirdParty);
    assert_eq!(intranet.created_at, original[1].created_at);

    store.close().await;
}

#[tokio::test]
async fn test_xml_export_lists_every_project() {
    let owner = OwnerId::new("source");
    let store = seeded_store(&owner).await;
    let projects = store.list_projects(&owner).await.unwrap();

    let xml = export_projects(&projects, ExportFormat::Xml).unwrap();
    assert!(xml.starts_with("<Projects>"));
    assert_eq!(xml.matches("<Project>").count(), 2);
    assert!(xml.contains("<Title>Archive scanning</Title>"));
    assert!(xml.contains("<Description>Portal; search \"everything\"\nsecond line</Description>"));

    store.close().await;
}

#[tokio::test]
async fn test_query_results_render_in_every_format() {
    let service = QueryService::new(
        ReadOnlyQueryGuard::default(),
        QueryExecutor::new(
            Arc::new(SqliteClient::new("sqlite::memory:")),
            QueryLimits::default(),
        ),
    );
    let result = service
        .execute_read_only("SELECT 'Ada' AS name, NULL AS team, 3 AS projects")
        .await
        .unwrap();

    let table = render_result(&result, ResultFormat::Table).unwrap();
    assert!(table.contains("| name | team | projects |"));
    assert!(table.contains("NULL"));

    let json = render_result(&result, ResultFormat::Json).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[0]["name"], "Ada");
    assert!(parsed[0]["team"].is_null());
    assert_eq!(parsed[0]["projects"], 3);
    assert!(json.find("name").unwrap() < json.find("projects").unwrap());

    let csv = render_result(&result, ResultFormat::Csv).unwrap();
    assert_eq!(csv, "name,team,projects\nAda,,3\n");
}
