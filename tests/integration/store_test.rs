//! Project store integration tests.

use digiflow::error::DigiflowError;
use digiflow::persistence::{
    NewProject, NewProposal, NewRequirement, OwnerId, Priority, ProjectQuery, ProjectStatus,
    ProjectStore, ProposalKind, RequirementStatus,
};
use tempfile::tempdir;

async fn create_test_store() -> (ProjectStore, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test_projects.db");
    let store = ProjectStore::open(&path).await.unwrap();
    (store, dir)
}

fn alice() -> OwnerId {
    OwnerId::new("alice")
}

fn bob() -> OwnerId {
    OwnerId::new("bob")
}

#[tokio::test]
async fn test_project_crud() {
    let (store, _dir) = create_test_store().await;
    let owner = alice();

    let created = store
        .create_project(
            &NewProject::new("Intranet relaunch", "Ada")
                .with_description("Replace the old portal")
                .with_technology("Rust"),
            &owner,
        )
        .await
        .unwrap();
    assert!(created.id > 0);
    assert_eq!(created.status, ProjectStatus::Planned);
    assert_eq!(created.owner_id, owner);

    let fetched = store.get_project(created.id, &owner).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Intranet relaunch");
    assert_eq!(fetched.description, "Replace the old portal");

    let mut changes = NewProject::from(&fetched).with_status(ProjectStatus::Completed);
    changes.completed_at = Some(chrono::Utc::now());
    let updated = store
        .update_project(created.id, &changes, &owner)
        .await
        .unwrap();
    assert_eq!(updated.status, ProjectStatus::Completed);
    assert!(updated.completed_at.is_some());
    assert_eq!(updated.created_at, fetched.created_at);

    assert!(store.delete_project(created.id, &owner).await.unwrap());
    assert!(store.get_project(created.id, &owner).await.unwrap().is_none());
    assert!(!store.delete_project(created.id, &owner).await.unwrap());

    store.close().await;
}

#[tokio::test]
async fn test_invalid_project_is_not_stored() {
    let (store, _dir) = create_test_store().await;

    let err = store
        .create_project(&NewProject::new("ab", "Ada"), &alice())
        .await
        .unwrap_err();
    assert!(matches!(err, DigiflowError::Validation(_)));

    let err = store
        .create_project(&NewProject::new("Valid title", " "), &alice())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("responsible"));

    assert!(store.list_projects(&alice()).await.unwrap().is_empty());
    store.close().await;
}

#[tokio::test]
async fn test_owners_never_see_each_other() {
    let (store, _dir) = create_test_store().await;

    let mine = store
        .create_project(&NewProject::new("Alice project", "Ada"), &alice())
        .await
        .unwrap();
    store
        .create_project(&NewProject::new("Bob project", "Bob"), &bob())
        .await
        .unwrap();

    let listed = store.list_projects(&alice()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Alice project");

    assert!(store.get_project(mine.id, &bob()).await.unwrap().is_none());
    assert!(!store.delete_project(mine.id, &bob()).await.unwrap());
    let found = store.search_projects("project", &bob()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "Bob project");

    let err = store
        .update_project(mine.id, &NewProject::new("Taken over", "Bob"), &bob())
        .await
        .unwrap_err();
    assert!(matches!(err, DigiflowError::NotFound(_)));

    let err = store
        .add_requirement(mine.id, &NewRequirement::new("Sneaky", "Bob"), &bob())
        .await
        .unwrap_err();
    assert!(matches!(err, DigiflowError::NotFound(_)));

    let untouched = store.get_project(mine.id, &alice()).await.unwrap().unwrap();
    assert_eq!(untouched.title, "Alice project");
    assert!(untouched.requirements.is_empty());

    store.close().await;
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let (store, _dir) = create_test_store().await;
    for title in ["First", "Second", "Third"] {
        store
            .create_project(&NewProject::new(format!("{title} project"), "Ada"), &alice())
            .await
            .unwrap();
    }

    let titles: Vec<_> = store
        .list_projects(&alice())
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.title)
        .collect();
    assert_eq!(titles, ["Third project", "Second project", "First project"]);

    store.close().await;
}

#[tokio::test]
async fn test_status_filter_and_search() {
    let (store, _dir) = create_test_store().await;
    let owner = alice();

    store
        .create_project(
            &NewProject::new("ERP migration", "Ada")
                .with_technology("SAP")
                .with_status(ProjectStatus::InProgress),
            &owner,
        )
        .await
        .unwrap();
    store
        .create_project(
            &NewProject::new("Website", "Grace").with_description("Move to 100% static pages"),
            &owner,
        )
        .await
        .unwrap();

    let in_progress = store
        .projects_by_status(ProjectStatus::InProgress, &owner)
        .await
        .unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].title, "ERP migration");

    assert_eq!(store.search_projects("sap", &owner).await.unwrap().len(), 1);
    assert_eq!(store.search_projects("GRACE", &owner).await.unwrap().len(), 1);
    assert_eq!(store.search_projects("100%", &owner).await.unwrap().len(), 1);
    assert_eq!(store.search_projects("%", &owner).await.unwrap().len(), 1);
    assert_eq!(store.search_projects("  ", &owner).await.unwrap().len(), 2);
    assert!(store.search_projects("cobol", &owner).await.unwrap().is_empty());

    store.close().await;
}

#[tokio::test]
async fn test_pagination() {
    let (store, _dir) = create_test_store().await;
    let owner = alice();
    let batch: Vec<_> = (1..=23)
        .map(|i| {
            let status = if i % 2 == 0 {
                ProjectStatus::Paused
            } else {
                ProjectStatus::Planned
            };
            NewProject::new(format!("Project {i:02}"), "Ada").with_status(status)
        })
        .collect();
    store.create_projects_batch(&batch, &owner).await.unwrap();

    let query = ProjectQuery {
        page: 3,
        page_size: 10,
        ..ProjectQuery::default()
    };
    let page = store.list_projects_paginated(&owner, &query).await.unwrap();
    assert_eq!(page.total_count, 23);
    assert_eq!(page.total_pages(), 3);
    assert_eq!(page.items.len(), 3);
    assert!(page.has_previous());
    assert!(!page.has_next());
    assert_eq!(page.items[2].title, "Project 01");

    let query = ProjectQuery {
        page: 0,
        page_size: 0,
        status: Some(ProjectStatus::Paused),
        search: None,
    };
    let page = store.list_projects_paginated(&owner, &query).await.unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 1);
    assert_eq!(page.total_count, 11);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].title, "Project 22");

    let query = ProjectQuery {
        search: Some("Project 1".to_string()),
        ..ProjectQuery::default()
    };
    let page = store.list_projects_paginated(&owner, &query).await.unwrap();
    assert_eq!(page.total_count, 10);

    let query = ProjectQuery {
        page: 9,
        ..ProjectQuery::default()
    };
    let page = store.list_projects_paginated(&owner, &query).await.unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_count, 23);

    store.close().await;
}

#[tokio::test]
async fn test_batch_is_all_or_nothing() {
    let (store, _dir) = create_test_store().await;
    let batch = vec![
        NewProject::new("Good project", "Ada"),
        NewProject::new("", "Ada"),
        NewProject::new("Another good one", "Ada"),
    ];

    let err = store
        .create_projects_batch(&batch, &alice())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("project 2"));
    assert!(store.list_projects(&alice()).await.unwrap().is_empty());

    store.close().await;
}

#[tokio::test]
async fn test_batch_stores_children() {
    let (store, _dir) = create_test_store().await;
    let mut project = NewProject::new("Document management", "Ada");
    project
        .requirements
        .push(NewRequirement::new("Full text search", "Bob").with_priority(Priority::High));
    project.proposals.push(
        NewProposal::new("Buy a DMS", ProposalKind::ThirdParty).with_rationale("Faster rollout"),
    );

    let created = store
        .create_projects_batch(&[project], &alice())
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].requirements.len(), 1);
    assert_eq!(created[0].requirements[0].priority, Priority::High);
    assert_eq!(created[0].proposals[0].rationale, "Faster rollout");
    assert_eq!(created[0].requirements[0].project_id, created[0].id);

    store.close().await;
}

#[tokio::test]
async fn test_requirement_lifecycle() {
    let (store, _dir) = create_test_store().await;
    let owner = alice();
    let project = store
        .create_project(&NewProject::new("Intranet", "Ada"), &owner)
        .await
        .unwrap();

    let requirement = store
        .add_requirement(project.id, &NewRequirement::new("Single sign-on", "Bob"), &owner)
        .await
        .unwrap();
    assert_eq!(requirement.status, RequirementStatus::Open);
    assert_eq!(requirement.priority, Priority::Medium);

    store
        .update_requirement_status(requirement.id, RequirementStatus::Resolved, &owner)
        .await
        .unwrap();
    let reloaded = store.get_project(project.id, &owner).await.unwrap().unwrap();
    assert_eq!(reloaded.requirements[0].status, RequirementStatus::Resolved);

    let err = store
        .update_requirement_status(requirement.id, RequirementStatus::Open, &bob())
        .await
        .unwrap_err();
    assert!(matches!(err, DigiflowError::NotFound(_)));
    assert!(!store.delete_requirement(requirement.id, &bob()).await.unwrap());

    assert!(store.delete_requirement(requirement.id, &owner).await.unwrap());
    let reloaded = store.get_project(project.id, &owner).await.unwrap().unwrap();
    assert!(reloaded.requirements.is_empty());

    store.close().await;
}

#[tokio::test]
async fn test_proposal_lifecycle() {
    let (store, _dir) = create_test_store().await;
    let owner = alice();
    let project = store
        .create_project(&NewProject::new("Intranet", "Ada"), &owner)
        .await
        .unwrap();

    let proposal = store
        .add_proposal(
            project.id,
            &NewProposal::new("Build in house", ProposalKind::InHouse),
            &owner,
        )
        .await
        .unwrap();
    assert!(!proposal.accepted);

    store
        .set_proposal_accepted(proposal.id, true, &owner)
        .await
        .unwrap();
    let reloaded = store.get_project(project.id, &owner).await.unwrap().unwrap();
    assert!(reloaded.proposals[0].accepted);

    let err = store
        .set_proposal_accepted(proposal.id, false, &bob())
        .await
        .unwrap_err();
    assert!(matches!(err, DigiflowError::NotFound(_)));

    assert!(store.delete_proposal(proposal.id, &owner).await.unwrap());
    assert!(!store.delete_proposal(proposal.id, &owner).await.unwrap());

    store.close().await;
}
