use super::*;

#[test]
fn page_bounds_defaults_and_clamps() {
    assert_eq!(page_bounds(None, None), (20, 0));
    assert_eq!(page_bounds(Some(500), Some(40)), (100, 40));
    assert_eq!(page_bounds(Some(0), Some(-3)), (1, 0));
}

#[test]
fn search_pattern_wraps_and_escapes() {
    assert_eq!(search_pattern(" bert "), "%bert%");
    assert_eq!(search_pattern("50%_off"), "%50\\%\\_off%");
    assert_eq!(search_pattern(r"a\b"), r"%a\\b%");
}

#[test]
fn check_name_trims_and_bounds() {
    assert_eq!(check_name("  Sentiment v2 ").unwrap(), "Sentiment v2");
    assert!(matches!(check_name("   "), Err(ModelError::Invalid(_))));
    assert!(matches!(check_name(&"n".repeat(101)), Err(ModelError::Invalid(_))));
}

#[test]
fn check_tags_drops_blanks_and_caps_count() {
    let tags = check_tags(vec![" nlp ".into(), String::new(), "vision".into()]).unwrap();
    assert_eq!(tags, vec!["nlp", "vision"]);

    let many = (0..21).map(|i| format!("t{i}")).collect();
    assert!(matches!(check_tags(many), Err(ModelError::Invalid(_))));
}

#[test]
fn check_price_rejects_negative() {
    assert_eq!(check_price(0).unwrap(), 0);
    assert!(matches!(check_price(-1), Err(ModelError::Invalid(_))));
}

#[test]
fn visibility_defaults_private() {
    assert_eq!(Visibility::default(), Visibility::Private);
    let v: Visibility = serde_json::from_str(r#""public""#).unwrap();
    assert_eq!(v, Visibility::Public);
}

#[test]
fn new_model_description_is_optional() {
    let req: NewModel = serde_json::from_str(r#"{"name":"m","model_type":"classifier"}"#).unwrap();
    assert_eq!(req.description, "");
    assert!(req.tags.is_none());
}

// =============================================================================
// live database
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::state::test_helpers::{live_pool, live_user};

    fn model(name: &str, visibility: Visibility) -> NewModel {
        NewModel {
            name: name.into(),
            description: "sentiment classifier".into(),
            model_type: "classifier".into(),
            version: None,
            tags: Some(vec!["nlp".into()]),
            visibility: Some(visibility),
            price_cents: Some(500),
        }
    }

    #[tokio::test]
    async fn crud_is_owner_only() {
        let pool = live_pool().await;
        let owner = live_user(&pool).await;
        let stranger = live_user(&pool).await;

        let created = create(&pool, owner, model("owned", Visibility::Private)).await.unwrap();
        assert_eq!(created.version, "1.0.0");
        assert_eq!(created.owner_id, owner);

        assert!(matches!(get_owned(&pool, stranger, created.id).await, Err(ModelError::NotFound)));
        let rename = ModelPatch { name: Some("stolen".into()), ..ModelPatch::default() };
        assert!(matches!(update(&pool, stranger, created.id, rename).await, Err(ModelError::NotFound)));
        assert!(matches!(delete(&pool, stranger, created.id).await, Err(ModelError::NotFound)));
        assert!(list_owned(&pool, stranger).await.unwrap().is_empty());

        let patch = ModelPatch { description: Some("updated".into()), ..ModelPatch::default() };
        let updated = update(&pool, owner, created.id, patch).await.unwrap();
        assert_eq!(updated.name, "owned");
        assert_eq!(updated.description, "updated");

        delete(&pool, owner, created.id).await.unwrap();
        assert!(matches!(get_owned(&pool, owner, created.id).await, Err(ModelError::NotFound)));
    }

    #[tokio::test]
    async fn marketplace_hides_private_models() {
        let pool = live_pool().await;
        let owner = live_user(&pool).await;
        let marker = Uuid::new_v4().simple().to_string();

        let private = create(&pool, owner, model(&format!("{marker}-private"), Visibility::Private)).await.unwrap();
        let public = create(&pool, owner, model(&format!("{marker}-public"), Visibility::Public)).await.unwrap();

        assert!(matches!(get_public(&pool, private.id).await, Err(ModelError::NotFound)));
        assert_eq!(get_public(&pool, public.id).await.unwrap().id, public.id);

        let found = list_public(&pool, Some(marker.as_str()), 20, 0).await.unwrap();
        assert_eq!(found.iter().map(|m| m.id).collect::<Vec<_>>(), vec![public.id]);
    }
}
