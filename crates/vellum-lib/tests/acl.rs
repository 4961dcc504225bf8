mod common;

use common::{admin, user, TestHarness};
use vellum_lib::model::{Ace, Acl, AclPropagation};
use vellum_lib::view::ViewOptions;
use vellum_lib::RepositoryError;

fn principals(acl: &Acl) -> Vec<(String, Vec<String>, bool)> {
    acl.aces
        .iter()
        .map(|a| {
            (
                a.principal_id.clone(),
                a.permissions.iter().cloned().collect(),
                a.direct,
            )
        })
        .collect()
}

#[test]
fn test_children_inherit_ancestor_entries() {
    let h = TestHarness::new();
    let projects = h.folder(&h.root(), "projects");
    h.grant(&projects, &[Ace::new("alice", ["cmis:write"])]);
    let drafts = h.folder(&projects, "drafts");

    let acl = h.service.get_acl(&admin(), &drafts).unwrap();
    assert_eq!(
        principals(&acl),
        vec![
            ("alice".to_string(), vec!["cmis:write".to_string()], false),
            ("anyone".to_string(), vec!["cmis:read".to_string()], false),
        ]
    );

    let view = h.view(&user("alice"), &drafts);
    assert_eq!(view.name(), Some("drafts"));
}

#[test]
fn test_non_inheriting_object_cuts_off_ancestors() {
    let h = TestHarness::new();
    let hr = h.folder(&h.root(), "hr");
    h.restrict(&hr, &[Ace::new("bob", ["cmis:read"])]);
    let payroll = h.folder(&hr, "payroll");

    let acl = h.service.get_acl(&admin(), &payroll).unwrap();
    assert_eq!(
        principals(&acl),
        vec![("bob".to_string(), vec!["cmis:read".to_string()], false)]
    );

    assert!(h
        .service
        .get_object(&user("bob"), &payroll, &ViewOptions::default())
        .is_ok());
    assert!(matches!(
        h.service
            .get_object(&user("alice"), &payroll, &ViewOptions::default()),
        Err(RepositoryError::PermissionDenied(_))
    ));
    // Admins bypass the ACL.
    assert!(h
        .service
        .get_object(&admin(), &payroll, &ViewOptions::default())
        .is_ok());
}

#[test]
fn test_direct_entry_overrides_inherited_one() {
    let h = TestHarness::new();
    let team = h.folder(&h.root(), "team");
    h.grant(&team, &[Ace::new("alice", ["cmis:all"])]);
    let notes = h.folder(&team, "notes");
    h.grant(&notes, &[Ace::new("alice", ["cmis:read"])]);

    let acl = h.service.get_acl(&admin(), &notes).unwrap();
    let alice = acl.get("alice").unwrap();
    assert!(alice.direct);
    assert_eq!(alice.permissions.len(), 1);
    assert!(alice.permissions.contains("cmis:read"));
}

#[test]
fn test_nearer_ancestor_limits_grandchildren() {
    let h = TestHarness::new();
    let outer = h.folder(&h.root(), "outer");
    h.grant(&outer, &[Ace::new("bob", ["cmis:all"])]);
    let middle = h.folder(&outer, "middle");
    h.grant(&middle, &[Ace::new("bob", ["cmis:read"])]);
    let inner = h.folder(&middle, "inner");

    let acl = h.service.get_acl(&admin(), &inner).unwrap();
    let bob = acl.get("bob").unwrap();
    assert!(!bob.direct);
    assert_eq!(bob.permissions.iter().collect::<Vec<_>>(), vec!["cmis:read"]);

    assert!(matches!(
        h.service.delete_object(&user("bob"), &inner, false),
        Err(RepositoryError::PermissionDenied(_))
    ));
    assert!(h
        .service
        .get_object(&user("bob"), &inner, &ViewOptions::default())
        .is_ok());
}

#[test]
fn test_object_only_entries_do_not_propagate() {
    let h = TestHarness::new();
    let inbox = h.folder(&h.root(), "inbox");
    h.service
        .apply_acl(
            &admin(),
            &inbox,
            &[Ace::new("carol", ["cmis:write"])],
            AclPropagation::ObjectOnly,
            None,
        )
        .unwrap();
    let child = h.folder(&inbox, "child");

    assert!(h.service.get_acl(&admin(), &inbox).unwrap().get("carol").is_some());
    assert!(h.service.get_acl(&admin(), &child).unwrap().get("carol").is_none());
}

#[test]
fn test_ancestor_change_reaches_cached_descendant_views() {
    let h = TestHarness::new();
    let vault = h.folder(&h.root(), "vault");
    h.restrict(&vault, &[Ace::new("bob", ["cmis:read"])]);
    let inner = h.folder(&vault, "inner");
    let doc = h.document(&inner, "secret.txt", "s3cret");

    // Populate the view cache.
    assert!(h.view(&user("bob"), &doc.id).acl.is_some());
    assert!(matches!(
        h.service
            .get_object(&user("carol"), &doc.id, &ViewOptions::default()),
        Err(RepositoryError::PermissionDenied(_))
    ));

    h.restrict(
        &vault,
        &[
            Ace::new("bob", ["cmis:read"]),
            Ace::new("carol", ["cmis:read"]),
        ],
    );

    let view = h.view(&user("carol"), &doc.id);
    let acl = view.acl.unwrap();
    assert!(acl.get("carol").is_some());
}

#[test]
fn test_top_level_objects_start_private_when_configured() {
    let h = TestHarness::builder()
        .configure(|c| c.capabilities.inherit_at_top_level = false)
        .build();
    let home = h.folder(&h.root(), "home");

    let acl = h.service.get_acl(&admin(), &home).unwrap();
    assert_eq!(
        principals(&acl),
        vec![("admin".to_string(), vec!["cmis:all".to_string()], true)]
    );
    assert!(matches!(
        h.service.get_object(&user("alice"), &home, &ViewOptions::default()),
        Err(RepositoryError::PermissionDenied(_))
    ));

    // Deeper levels inherit as usual.
    let nested = h.folder(&home, "nested");
    assert!(h.service.get_acl(&admin(), &nested).unwrap().get("admin").is_some());
}

#[test]
fn test_apply_acl_needs_all_permission() {
    let h = TestHarness::new();
    let shared = h.folder(&h.root(), "shared");
    h.grant(&shared, &[Ace::new("alice", ["cmis:write"])]);

    let result = h.service.apply_acl(
        &user("alice"),
        &shared,
        &[Ace::new("alice", ["cmis:all"])],
        AclPropagation::Propagate,
        None,
    );
    assert!(matches!(result, Err(RepositoryError::PermissionDenied(_))));
    assert!(h.service.get_acl(&admin(), &shared).unwrap().get("alice").is_some());
}

#[test]
fn test_allowable_actions_follow_permissions() {
    use vellum_lib::acl::Action;

    let h = TestHarness::new();
    let folder = h.folder(&h.root(), "docs");
    h.grant(&folder, &[Ace::new("alice", ["cmis:write"])]);
    let doc = h.document(&folder, "a.txt", "a");

    let alice = h.service.get_allowable_actions(&user("alice"), &doc.id).unwrap();
    assert!(alice.contains(&Action::GetProperties));
    assert!(alice.contains(&Action::UpdateProperties));
    assert!(alice.contains(&Action::CheckOut));
    assert!(!alice.contains(&Action::DeleteObject));
    assert!(!alice.contains(&Action::ApplyAcl));

    let reader = h.service.get_allowable_actions(&user("dave"), &doc.id).unwrap();
    assert!(reader.contains(&Action::GetContentStream));
    assert!(!reader.contains(&Action::UpdateProperties));
}
