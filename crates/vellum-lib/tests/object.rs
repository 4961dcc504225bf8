mod common;

use common::{admin, text, user, TestHarness};
use vellum_lib::cache::CacheFacet;
use vellum_lib::model::{
    ids, Ace, AclPropagation, BaseType, ContentStream, ContentStreamAllowed, Properties,
    PropertyValue, TypeDefinition, VersioningState,
};
use vellum_lib::view::ViewOptions;
use vellum_lib::{ContentStore, CreateRequest, RelationshipDirection, RepositoryError};

fn attachment_ref(h: &TestHarness, id: &str) -> String {
    h.store
        .get_content(id)
        .unwrap()
        .as_document()
        .and_then(|d| d.attachment_ref.clone())
        .expect("document has an attachment")
}

#[test]
fn test_create_then_get_returns_what_was_stored() {
    let h = TestHarness::new();
    let created = h
        .service
        .create(
            &admin(),
            CreateRequest::new("cmis:document", "invoice.pdf")
                .in_folder(&h.root())
                .with_property(ids::DESCRIPTION, "March invoice")
                .with_property("acme:customer", "Initech")
                .with_stream(ContentStream::new("application/pdf", vec![1u8, 2, 3])),
        )
        .unwrap();

    let view = h.view(&admin(), &created.id);
    assert_eq!(view.id, created.id);
    assert_eq!(view.base_type, BaseType::Document);
    assert_eq!(view.object_type_id, "cmis:document");
    assert_eq!(view.name(), Some("invoice.pdf"));
    assert_eq!(view.change_token(), Some(created.revision_token.as_str()));
    assert_eq!(view.properties.get_str(ids::DESCRIPTION), Some("March invoice"));
    assert_eq!(view.properties.get("acme:customer"), Some(&text("Initech")));
    assert_eq!(view.properties.get_str(ids::CREATED_BY), Some("admin"));
    assert_eq!(view.properties.get_str(ids::PARENT_ID), Some(h.root().as_str()));
    assert_eq!(view.properties.get_str(ids::VERSION_LABEL), Some("1.0"));

    let stream = h
        .service
        .get_content_stream(&admin(), &created.id)
        .unwrap()
        .unwrap();
    assert_eq!(stream.data, vec![1u8, 2, 3]);
    assert_eq!(stream.mime_type, "application/pdf");

    let by_path = h
        .service
        .get_object_by_path(&admin(), "/invoice.pdf", &ViewOptions::default())
        .unwrap();
    assert_eq!(by_path.id, created.id);
}

#[test]
fn test_filter_keeps_identity_properties() {
    let h = TestHarness::new();
    let doc = h.document(&h.root(), "a.txt", "a");
    let view = h
        .service
        .get_object(
            &admin(),
            &doc.id,
            &ViewOptions::default().with_filter([ids::NAME]),
        )
        .unwrap();

    assert_eq!(view.name(), Some("a.txt"));
    assert!(view.properties.get(ids::OBJECT_ID).is_some());
    assert!(view.properties.get(ids::CREATED_BY).is_none());
    assert!(view.acl.is_none());
    assert!(view.allowable_actions.is_none());
}

#[test]
fn test_create_rejects_bad_input() {
    let h = TestHarness::new();
    let root = h.root();

    let no_parent = h
        .service
        .create(&admin(), CreateRequest::new("cmis:folder", "orphan"));
    assert!(matches!(no_parent, Err(RepositoryError::InvalidArgument(_))));

    let unknown_type = h.service.create(
        &admin(),
        CreateRequest::new("acme:unknown", "x").in_folder(&root),
    );
    assert!(matches!(unknown_type, Err(RepositoryError::NotFound(_))));

    let read_only = h.service.create(
        &admin(),
        CreateRequest::new("cmis:folder", "x")
            .in_folder(&root)
            .with_property(ids::CREATED_BY, "mallory"),
    );
    assert!(matches!(read_only, Err(RepositoryError::InvalidArgument(_))));

    let wrong_base = h.service.create_document(
        &admin(),
        CreateRequest::new("cmis:folder", "x").in_folder(&root),
    );
    assert!(matches!(
        wrong_base,
        Err(RepositoryError::Constraint { .. })
    ));

    let slash = h.service.create(
        &admin(),
        CreateRequest::new("cmis:folder", "a/b").in_folder(&root),
    );
    assert!(matches!(slash, Err(RepositoryError::InvalidArgument(_))));

    let denied = h.service.create(
        &user("alice"),
        CreateRequest::new("cmis:folder", "x").in_folder(&root),
    );
    assert!(matches!(denied, Err(RepositoryError::PermissionDenied(_))));
}

#[test]
fn test_names_are_unique_per_folder() {
    let h = TestHarness::new();
    let folder = h.folder(&h.root(), "docs");
    h.document(&folder, "Readme.txt", "a");

    let clash = h.service.create(
        &admin(),
        CreateRequest::new("cmis:document", "readme.TXT").in_folder(&folder),
    );
    assert!(matches!(clash, Err(RepositoryError::Constraint { .. })));

    // Elsewhere the name is free.
    h.document(&h.root(), "Readme.txt", "b");

    let relaxed = TestHarness::builder()
        .configure(|c| c.capabilities.unique_name_check = false)
        .build();
    relaxed.document(&relaxed.root(), "same.txt", "1");
    relaxed.document(&relaxed.root(), "same.txt", "2");
    assert_eq!(relaxed.child_names(&relaxed.root()), vec!["same.txt", "same.txt"]);
}

#[test]
fn test_stale_token_leaves_object_untouched() {
    let h = TestHarness::new();
    let doc = h.document(&h.root(), "a.txt", "a");
    let original = h.token(&doc.id);
    let rename = || Properties::new().with(ids::NAME, "b.txt");

    let stale = h
        .service
        .update_properties(&admin(), &doc.id, rename(), Some("not-the-token"));
    assert!(matches!(stale, Err(RepositoryError::UpdateConflict { .. })));
    let missing = h.service.update_properties(&admin(), &doc.id, rename(), None);
    assert!(matches!(missing, Err(RepositoryError::UpdateConflict { .. })));
    assert_eq!(h.view(&admin(), &doc.id).name(), Some("a.txt"));
    assert_eq!(h.token(&doc.id), original);

    let updated = h
        .service
        .update_properties(&admin(), &doc.id, rename(), Some(&original))
        .unwrap();
    assert_ne!(updated.revision_token, original);

    let replay = h
        .service
        .update_properties(&admin(), &doc.id, rename(), Some(&original));
    assert!(matches!(replay, Err(RepositoryError::UpdateConflict { .. })));
}

#[test]
fn test_reads_see_completed_updates() {
    let h = TestHarness::new();
    let folder = h.folder(&h.root(), "docs");
    let doc = h.document(&folder, "a.txt", "a");

    // Warm both caches.
    assert_eq!(h.view(&admin(), &doc.id).name(), Some("a.txt"));
    assert_eq!(h.child_names(&folder), vec!["a.txt"]);
    assert!(!h.service.caches().view().is_empty());

    let updated = h
        .service
        .update_properties(
            &admin(),
            &doc.id,
            Properties::new()
                .with(ids::NAME, "renamed.txt")
                .with("acme:tag", PropertyValue::Multi(vec![text("x"), text("y")])),
            Some(&doc.revision_token),
        )
        .unwrap();

    let view = h.view(&admin(), &doc.id);
    assert_eq!(view.name(), Some("renamed.txt"));
    assert_eq!(view.change_token(), Some(updated.revision_token.as_str()));
    assert_eq!(
        view.properties.get_str_list("acme:tag"),
        vec!["x".to_string(), "y".to_string()]
    );
    assert_eq!(h.child_names(&folder), vec!["renamed.txt"]);
}

#[test]
fn test_views_do_not_read_content_streams() {
    let h = TestHarness::new();
    let doc = h.document(&h.root(), "big.bin", "payload");
    let before = h.store.attachment_reads();

    h.view(&admin(), &doc.id);
    h.child_names(&h.root());
    h.service
        .get_all_versions(&admin(), &doc.id, &ViewOptions::full())
        .unwrap();
    assert_eq!(h.store.attachment_reads(), before);

    h.service.get_content_stream(&admin(), &doc.id).unwrap();
    assert_eq!(h.store.attachment_reads(), before + 1);
}

#[test]
fn test_stream_read_failure_surfaces_as_storage_error() {
    let h = TestHarness::new();
    let doc = h.document(&h.root(), "broken.bin", "payload");
    h.store.poison_attachment(&attachment_ref(&h, &doc.id));

    assert!(matches!(
        h.service.get_content_stream(&admin(), &doc.id),
        Err(RepositoryError::Storage(_))
    ));
    // Metadata stays readable.
    assert_eq!(h.view(&admin(), &doc.id).name(), Some("broken.bin"));
}

#[test]
fn test_append_fills_in_missing_token() {
    let h = TestHarness::new();
    let doc = h.document(&h.root(), "log.txt", "one");

    let first = h
        .service
        .append_content_stream(&admin(), &doc.id, ContentStream::new("text/plain", " two"), false, None)
        .unwrap();
    h.service
        .append_content_stream(
            &admin(),
            &doc.id,
            ContentStream::new("text/plain", " three"),
            true,
            Some(&first.revision_token),
        )
        .unwrap();

    let stream = h.service.get_content_stream(&admin(), &doc.id).unwrap().unwrap();
    assert_eq!(stream.data, b"one two three".to_vec());

    let stale = h.service.append_content_stream(
        &admin(),
        &doc.id,
        ContentStream::new("text/plain", "!"),
        true,
        Some(&first.revision_token),
    );
    assert!(matches!(stale, Err(RepositoryError::UpdateConflict { .. })));
}

#[test]
fn test_delete_content_stream() {
    let h = TestHarness::new();
    let doc = h.document(&h.root(), "tmp.txt", "x");
    let reference = attachment_ref(&h, &doc.id);

    h.service
        .delete_content_stream(&admin(), &doc.id, Some(&doc.revision_token))
        .unwrap();

    assert_eq!(h.service.get_content_stream(&admin(), &doc.id).unwrap(), None);
    assert!(h.store.get_attachment(&reference).is_err());
}

#[test]
fn test_move_between_folders() {
    let h = TestHarness::new();
    let inbox = h.folder(&h.root(), "inbox");
    let archive = h.folder(&h.root(), "archive");
    let doc = h.document(&inbox, "mail.eml", "hi");

    let wrong_source = h.service.move_object(
        &admin(),
        &doc.id,
        &archive,
        &archive,
        Some(&doc.revision_token),
    );
    assert!(matches!(wrong_source, Err(RepositoryError::InvalidArgument(_))));

    h.service
        .move_object(&admin(), &doc.id, &archive, &inbox, Some(&doc.revision_token))
        .unwrap();
    assert!(h.child_names(&inbox).is_empty());
    assert_eq!(h.child_names(&archive), vec!["mail.eml"]);
    assert_eq!(
        h.view(&admin(), &doc.id).properties.get_str(ids::PARENT_ID),
        Some(archive.as_str())
    );
}

#[test]
fn test_folder_cannot_move_below_itself() {
    let h = TestHarness::new();
    let outer = h.folder(&h.root(), "outer");
    let inner = h.folder(&outer, "inner");
    let token = h.token(&outer);

    let result = h
        .service
        .move_object(&admin(), &outer, &inner, &h.root(), Some(&token));
    assert!(matches!(result, Err(RepositoryError::Constraint { .. })));
    assert!(matches!(
        h.service.move_object(&admin(), &h.root(), &outer, &h.root(), None),
        Err(RepositoryError::Constraint { .. })
    ));
}

#[test]
fn test_delete_rules() {
    let h = TestHarness::new();
    let folder = h.folder(&h.root(), "full");
    let doc = h.document(&folder, "a.txt", "a");

    assert!(matches!(
        h.service.delete_object(&admin(), &folder, false),
        Err(RepositoryError::Constraint { .. })
    ));
    assert!(matches!(
        h.service.delete_object(&admin(), &h.root(), false),
        Err(RepositoryError::Constraint { .. })
    ));
    assert!(matches!(
        h.service.delete_object(&user("alice"), &doc.id, true),
        Err(RepositoryError::PermissionDenied(_))
    ));

    let reference = attachment_ref(&h, &doc.id);
    h.service.delete_object(&admin(), &doc.id, true).unwrap();
    assert!(h.store.get_attachment(&reference).is_err());
    h.service.delete_object(&admin(), &folder, false).unwrap();
    assert!(matches!(
        h.service.get_object(&admin(), &folder, &ViewOptions::default()),
        Err(RepositoryError::NotFound(_))
    ));
}

#[test]
fn test_immutable_objects_reject_changes() {
    let h = TestHarness::new();
    let created = h
        .service
        .create(
            &admin(),
            CreateRequest::new("cmis:item", "record")
                .in_folder(&h.root())
                .with_property(ids::IS_IMMUTABLE, true),
        )
        .unwrap();

    let update = h.service.update_properties(
        &admin(),
        &created.id,
        Properties::new().with(ids::DESCRIPTION, "changed"),
        Some(&created.revision_token),
    );
    assert!(matches!(update, Err(RepositoryError::Constraint { .. })));
    assert!(matches!(
        h.service.delete_object(&admin(), &created.id, false),
        Err(RepositoryError::Constraint { .. })
    ));
}

#[test]
fn test_relationships_follow_their_endpoints() {
    let h = TestHarness::new();
    let source = h.document(&h.root(), "source.md", "s");
    let target = h.document(&h.root(), "impl.rs", "t");

    let rel = h
        .service
        .create(
            &admin(),
            CreateRequest::relationship("cmis:relationship", "implements", &source.id, &target.id),
        )
        .unwrap();

    let view = h.view(&admin(), &source.id);
    assert_eq!(view.relationship_ids, vec![rel.id.clone()]);
    assert_eq!(
        h.view(&admin(), &rel.id).properties.get_str(ids::TARGET_ID),
        Some(target.id.as_str())
    );

    let filed = h.service.create(
        &admin(),
        CreateRequest::relationship("cmis:relationship", "x", &source.id, &target.id)
            .in_folder(&h.root()),
    );
    assert!(matches!(filed, Err(RepositoryError::InvalidArgument(_))));

    h.service.delete_object(&admin(), &source.id, true).unwrap();
    assert!(h.store.get_content(&rel.id).is_err());
    assert!(h.view(&admin(), &target.id).relationship_ids.is_empty());
}

#[test]
fn test_unfiled_policy() {
    let h = TestHarness::new();
    let policy = h
        .service
        .create(
            &admin(),
            CreateRequest::new("cmis:policy", "retention").with_property(ids::POLICY_TEXT, "7y"),
        )
        .unwrap();

    let view = h.view(&admin(), &policy.id);
    assert_eq!(view.base_type, BaseType::Policy);
    assert_eq!(view.properties.get_str(ids::POLICY_TEXT), Some("7y"));
    assert!(view.properties.get(ids::PARENT_ID).is_none());
}

fn document_subtype(id: &str, stream: ContentStreamAllowed) -> TypeDefinition {
    TypeDefinition::derived(id, &TypeDefinition::base(BaseType::Document)).with_content_stream(stream)
}

#[test]
fn test_stream_constraints_checked_before_reading() {
    let h = TestHarness::builder()
        .with_type(document_subtype("acme:memo", ContentStreamAllowed::NotAllowed))
        .with_type(document_subtype("acme:scan", ContentStreamAllowed::Required))
        .build();
    let memo = h
        .service
        .create(&admin(), CreateRequest::new("acme:memo", "memo").in_folder(&h.root()))
        .unwrap();
    let scan = h
        .service
        .create(
            &admin(),
            CreateRequest::new("acme:scan", "scan.tif")
                .in_folder(&h.root())
                .with_stream(ContentStream::new("image/tiff", "II*")),
        )
        .unwrap();

    // Lose the scan's attachment behind the service's back.
    let mut stored = h.store.get_content(&scan.id).unwrap();
    if let Some(doc) = stored.as_document_mut() {
        doc.attachment_ref = None;
    }
    h.store.update(stored).unwrap();
    h.service.caches().invalidate(&scan.id);

    let before = h.store.attachment_reads();
    assert!(matches!(
        h.service.get_content_stream(&admin(), &memo.id),
        Err(RepositoryError::Constraint { .. })
    ));
    assert!(matches!(
        h.service.get_content_stream(&admin(), &scan.id),
        Err(RepositoryError::Constraint { .. })
    ));
    assert_eq!(h.store.attachment_reads(), before);
}

#[test]
fn test_relationship_changes_refresh_endpoint_views() {
    let h = TestHarness::new();
    let source = h.document(&h.root(), "design.md", "s");
    let target = h.document(&h.root(), "main.rs", "t");
    let rel = h
        .service
        .create(
            &admin(),
            CreateRequest::relationship("cmis:relationship", "describes", &source.id, &target.id),
        )
        .unwrap();
    let warm = |h: &TestHarness| {
        h.view(&admin(), &source.id);
        h.view(&admin(), &target.id);
        assert!(h.service.caches().view().get(&source.id).is_some());
        assert!(h.service.caches().view().get(&target.id).is_some());
    };

    warm(&h);
    h.service
        .update_properties(
            &admin(),
            &rel.id,
            Properties::new().with(ids::NAME, "documents"),
            Some(&h.token(&rel.id)),
        )
        .unwrap();
    assert!(h.service.caches().view().get(&source.id).is_none());
    assert!(h.service.caches().view().get(&target.id).is_none());

    warm(&h);
    h.service
        .apply_acl(
            &admin(),
            &rel.id,
            &[Ace::new("bob", ["cmis:read"])],
            AclPropagation::Propagate,
            None,
        )
        .unwrap();
    assert!(h.service.caches().view().get(&source.id).is_none());
    assert!(h.service.caches().view().get(&target.id).is_none());
}

#[test]
fn test_object_parents() {
    let h = TestHarness::new();
    let hidden = h.folder(&h.root(), "hidden");
    h.restrict(&hidden, &[Ace::new("bob", ["cmis:read"])]);
    let doc = h.document(&hidden, "note.txt", "n");
    h.grant(&doc.id, &[Ace::new("carol", ["cmis:read"])]);

    let parents = h
        .service
        .get_object_parents(&user("bob"), &doc.id, &ViewOptions::default())
        .unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, hidden);

    // Carol reads the document but not the folder it is filed in.
    assert!(h
        .service
        .get_object_parents(&user("carol"), &doc.id, &ViewOptions::default())
        .unwrap()
        .is_empty());
    assert!(h
        .service
        .get_object_parents(&admin(), &h.root(), &ViewOptions::default())
        .unwrap()
        .is_empty());

    let policy = h
        .service
        .create(&admin(), CreateRequest::new("cmis:policy", "hold"))
        .unwrap();
    assert!(h
        .service
        .get_object_parents(&admin(), &policy.id, &ViewOptions::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_relationships_by_direction() {
    let h = TestHarness::new();
    let a = h.document(&h.root(), "a.txt", "a");
    let b = h.document(&h.root(), "b.txt", "b");
    let c = h.document(&h.root(), "c.txt", "c");
    let relate = |from: &str, to: &str, name: &str| {
        h.service
            .create(
                &admin(),
                CreateRequest::relationship("cmis:relationship", name, from, to),
            )
            .unwrap()
            .id
    };
    let outgoing = relate(&a.id, &b.id, "a-b");
    let incoming = relate(&c.id, &a.id, "c-a");

    let ids_for = |direction| -> Vec<String> {
        h.service
            .get_object_relationships(&admin(), &a.id, direction, &ViewOptions::default())
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect()
    };
    assert_eq!(ids_for(RelationshipDirection::default()), vec![outgoing.clone()]);
    assert_eq!(ids_for(RelationshipDirection::Target), vec![incoming.clone()]);
    assert_eq!(ids_for(RelationshipDirection::Either), vec![outgoing, incoming]);
}

#[test]
fn test_checked_out_documents_listing() {
    let h = TestHarness::new();
    let drafts = h.folder(&h.root(), "drafts");
    let other = h.folder(&h.root(), "other");
    let first = h.document(&drafts, "one.txt", "1");
    let second = h.document(&other, "two.txt", "2");
    let pwc = h.service.check_out(&admin(), &first.id).unwrap();
    h.service.check_out(&admin(), &second.id).unwrap();

    let in_drafts = h
        .service
        .get_checked_out_docs(&admin(), Some(drafts.as_str()), &ViewOptions::default())
        .unwrap();
    assert_eq!(in_drafts.len(), 1);
    assert_eq!(in_drafts[0].id, pwc.id);
    assert_eq!(
        h.service
            .get_checked_out_docs(&admin(), None, &ViewOptions::default())
            .unwrap()
            .len(),
        2
    );

    h.service.cancel_check_out(&admin(), &first.id).unwrap();
    assert!(h
        .service
        .get_checked_out_docs(&admin(), Some(drafts.as_str()), &ViewOptions::default())
        .unwrap()
        .is_empty());
    assert!(matches!(
        h.service
            .get_checked_out_docs(&admin(), Some(second.id.as_str()), &ViewOptions::default()),
        Err(RepositoryError::Constraint { .. })
    ));
}

#[test]
fn test_copy_document_from_source() {
    let h = TestHarness::new();
    let inbox = h.folder(&h.root(), "inbox");
    let archive = h.folder(&h.root(), "archive");
    let source = h
        .service
        .create(
            &admin(),
            CreateRequest::new("cmis:document", "report.txt")
                .in_folder(&inbox)
                .with_property("acme:tag", "q3")
                .with_stream(ContentStream::new("text/plain", "numbers"))
                .with_versioning_state(VersioningState::Minor),
        )
        .unwrap();

    let copy = h
        .service
        .create_document_from_source(
            &admin(),
            &source.id,
            CreateRequest::default()
                .in_folder(&archive)
                .with_property(ids::NAME, "report-q3.txt"),
        )
        .unwrap();

    let view = h.view(&admin(), &copy.id);
    assert_eq!(view.name(), Some("report-q3.txt"));
    assert_eq!(view.properties.get_str("acme:tag"), Some("q3"));
    assert_eq!(view.properties.get_str(ids::VERSION_LABEL), Some("1.0"));
    assert_ne!(
        view.properties.get_str(ids::VERSION_SERIES_ID),
        h.view(&admin(), &source.id).properties.get_str(ids::VERSION_SERIES_ID)
    );
    assert_ne!(attachment_ref(&h, &copy.id), attachment_ref(&h, &source.id));

    h.service.delete_object(&admin(), &source.id, true).unwrap();
    let stream = h.service.get_content_stream(&admin(), &copy.id).unwrap().unwrap();
    assert_eq!(stream.data, b"numbers".to_vec());

    // Same name in the same folder.
    let clash = h.service.create_document_from_source(
        &admin(),
        &copy.id,
        CreateRequest::default().in_folder(&archive),
    );
    assert!(matches!(clash, Err(RepositoryError::Constraint { .. })));
    let from_folder = h.service.create_document_from_source(
        &admin(),
        &inbox,
        CreateRequest::default().in_folder(&archive),
    );
    assert!(matches!(from_folder, Err(RepositoryError::Constraint { .. })));
}

#[test]
fn test_policy_application() {
    let h = TestHarness::new();
    let folder = h.folder(&h.root(), "contracts");
    h.grant(&folder, &[Ace::new("bob", ["cmis:read"])]);
    let doc = h.document(&folder, "nda.pdf", "%PDF");
    let policy = h
        .service
        .create(&admin(), CreateRequest::new("cmis:policy", "legal-hold"))
        .unwrap();

    assert!(matches!(
        h.service.apply_policy(&user("bob"), &policy.id, &doc.id),
        Err(RepositoryError::PermissionDenied(_))
    ));
    h.service.apply_policy(&admin(), &policy.id, &doc.id).unwrap();
    h.service.apply_policy(&admin(), &policy.id, &doc.id).unwrap();

    let applied = h
        .service
        .get_applied_policies(&admin(), &doc.id, &ViewOptions::default())
        .unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].id, policy.id);
    assert_eq!(h.view(&admin(), &doc.id).policy_ids, vec![policy.id.clone()]);
    assert!(matches!(
        h.service.delete_object(&admin(), &policy.id, false),
        Err(RepositoryError::Constraint { .. })
    ));
    assert!(matches!(
        h.service.apply_policy(&admin(), &doc.id, &policy.id),
        Err(RepositoryError::Constraint { .. })
    ));

    h.service.remove_policy(&admin(), &policy.id, &doc.id).unwrap();
    assert!(h.view(&admin(), &doc.id).policy_ids.is_empty());
    assert!(matches!(
        h.service.remove_policy(&admin(), &policy.id, &doc.id),
        Err(RepositoryError::Constraint { .. })
    ));
    h.service.delete_object(&admin(), &policy.id, false).unwrap();
}

#[test]
fn test_deleted_objects_leave_their_policies() {
    let h = TestHarness::new();
    let doc = h.document(&h.root(), "draft.txt", "d");
    let policy = h
        .service
        .create(&admin(), CreateRequest::new("cmis:policy", "retention"))
        .unwrap();
    h.service.apply_policy(&admin(), &policy.id, &doc.id).unwrap();

    h.service.delete_object(&admin(), &doc.id, true).unwrap();
    assert!(h
        .store
        .get_applied_policies(&doc.id)
        .unwrap()
        .is_empty());
    h.service.delete_object(&admin(), &policy.id, false).unwrap();
}

#[test]
fn test_renditions_travel_with_views() {
    let h = TestHarness::new();
    let doc = h.document(&h.root(), "photo.jpg", "jpeg");
    let plain = h.document(&h.root(), "plain.txt", "p");
    let thumb = h
        .service
        .add_rendition(
            &admin(),
            &doc.id,
            "cmis:thumbnail",
            Some("small"),
            ContentStream::new("image/png", vec![0x89u8, b'P', b'N', b'G']),
        )
        .unwrap();
    assert_eq!(thumb.length, 4);

    let before = h.store.attachment_reads();
    let full = h.view(&admin(), &doc.id);
    assert_eq!(full.renditions, vec![thumb.clone()]);
    assert!(h
        .service
        .get_object(&admin(), &doc.id, &ViewOptions::default())
        .unwrap()
        .renditions
        .is_empty());
    assert!(h.view(&admin(), &plain.id).renditions.is_empty());
    assert_eq!(h.store.attachment_reads(), before);

    assert_eq!(h.service.get_renditions(&admin(), &doc.id).unwrap(), vec![thumb.clone()]);
    let stream = h
        .service
        .get_rendition_stream(&admin(), &doc.id, &thumb.id)
        .unwrap();
    assert_eq!(stream.mime_type, "image/png");
    assert!(matches!(
        h.service.get_rendition_stream(&admin(), &plain.id, &thumb.id),
        Err(RepositoryError::NotFound(_))
    ));

    // The working copy gets its own copy of each rendition.
    let pwc = h.service.check_out(&admin(), &doc.id).unwrap();
    let copied = h.view(&admin(), &pwc.id).renditions;
    assert_eq!(copied.len(), 1);
    assert_ne!(copied[0].id, thumb.id);
    assert_eq!(copied[0].kind, "cmis:thumbnail");

    let policy = h
        .service
        .create(&admin(), CreateRequest::new("cmis:policy", "p"))
        .unwrap();
    assert!(matches!(
        h.service.add_rendition(
            &admin(),
            &policy.id,
            "cmis:thumbnail",
            None,
            ContentStream::new("image/png", "x"),
        ),
        Err(RepositoryError::Constraint { .. })
    ));
}

#[test]
fn test_append_keeps_version_in_place() {
    let h = TestHarness::new();
    let doc = h.document(&h.root(), "upload.bin", "part1");

    let appended = h
        .service
        .append_content_stream(&admin(), &doc.id, ContentStream::new("text/plain", "part2"), true, None)
        .unwrap();
    assert_eq!(appended.id, doc.id);
    let versions = h
        .service
        .get_all_versions(&admin(), &doc.id, &ViewOptions::default())
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(
        h.view(&admin(), &doc.id).properties.get_str(ids::VERSION_LABEL),
        Some("1.0")
    );
}
