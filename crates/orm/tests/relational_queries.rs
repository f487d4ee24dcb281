use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use elif_odm::{
    types, Database, MemoryDriver, Model, ModelDefinition, ModelError, ModelEvent, ModelInstance,
    OnComplete, Operator, OrderDirection, QueryMethods, RelationshipError, Schema, StorageDriver,
    TypeBuilder,
};
use elif_odm::identity::prepare_to_store;
use futures::{StreamExt, TryStreamExt};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio_test::assert_ok;

struct User;

impl Model for User {
    const NAME: &'static str = "User";

    fn define(def: ModelDefinition) -> ModelDefinition {
        def.schema(
            Schema::new()
                .field("username", types::string().required())
                .field("age", types::number()),
        )
        .has_many("chats", "Chat")
        .has_one("profile", "Profile")
    }
}

struct Chat;

impl Model for Chat {
    const NAME: &'static str = "Chat";

    fn define(def: ModelDefinition) -> ModelDefinition {
        def.schema(Schema::new().field("name", types::string().required()))
            .has_many("messages", "Message")
            .soft_delete(true)
    }
}

struct Message;

impl Model for Message {
    const NAME: &'static str = "Message";

    fn define(def: ModelDefinition) -> ModelDefinition {
        def.schema(Schema::new().field("message", types::string().required()))
    }
}

struct Profile;

impl Model for Profile {
    const NAME: &'static str = "Profile";

    fn define(def: ModelDefinition) -> ModelDefinition {
        def.schema(Schema::new().field("bio", types::string()))
    }
}

struct Post;

impl Model for Post {
    const NAME: &'static str = "Post";

    fn define(def: ModelDefinition) -> ModelDefinition {
        def.schema(Schema::new().field("title", types::string().required()))
            .morph_many("comments", "Comment")
            .morph_one("image", "Image")
            .embed_many("tags", "Tag")
    }
}

struct Comment;

impl Model for Comment {
    const NAME: &'static str = "Comment";

    fn define(def: ModelDefinition) -> ModelDefinition {
        def.schema(Schema::new().field("body", types::string().required()))
    }
}

struct Image;

impl Model for Image {
    const NAME: &'static str = "Image";

    fn define(def: ModelDefinition) -> ModelDefinition {
        def.schema(Schema::new().field("url", types::string().required()))
    }
}

struct Tag;

impl Model for Tag {
    const NAME: &'static str = "Tag";

    fn define(def: ModelDefinition) -> ModelDefinition {
        def.schema(Schema::new().field("name", types::string().required()))
    }
}

async fn database() -> (Database, Arc<MemoryDriver>) {
    let driver = Arc::new(MemoryDriver::new());
    let db = Database::builder()
        .driver("default", driver.clone())
        .model::<User>()
        .model::<Chat>()
        .model::<Message>()
        .model::<Profile>()
        .model::<Post>()
        .model::<Comment>()
        .model::<Image>()
        .model::<Tag>()
        .connect()
        .await
        .unwrap();
    (db, driver)
}

/// ardalan: "general" (2 messages, one containing a 6) and "random" (none)
/// bob: "support" (1 message)
/// carol: no chats
async fn seed(db: &Database) -> Vec<ModelInstance> {
    let mut users = Vec::new();
    for (username, age) in [("ardalan", 25), ("bob", 31), ("carol", 19)] {
        users.push(User::create(db, json!({ "username": username, "age": age })).await.unwrap());
    }

    let mut general = users[0].relation("chats").unwrap().create(json!({ "name": "general" })).await.unwrap();
    general
        .relation("messages")
        .unwrap()
        .insert(vec![json!({ "message": "message 1" }), json!({ "message": "message 6" })])
        .await
        .unwrap();
    users[0].relation("chats").unwrap().create(json!({ "name": "random" })).await.unwrap();

    let mut support = users[1].relation("chats").unwrap().create(json!({ "name": "support" })).await.unwrap();
    support
        .relation("messages")
        .unwrap()
        .create(json!({ "message": "message 2" }))
        .await
        .unwrap();

    users
}

fn usernames(rows: &[ModelInstance]) -> Vec<String> {
    let mut names: Vec<String> = rows
        .iter()
        .filter_map(|row| row.attributes().get("username").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_nested_eager_load_is_one_request() {
    let (db, driver) = database().await;
    seed(&db).await;

    let before = driver.request_count();
    let users = User::with(&db, &["chats.messages"]).order_by_desc("age").get().await.unwrap();
    assert_eq!(driver.request_count() - before, 1);
    assert_eq!(usernames(&users), vec!["ardalan", "bob", "carol"]);

    let ardalan = users.iter().find(|u| u.attributes()["username"] == json!("ardalan")).unwrap();
    assert!(!ardalan.attributes().contains_key("chats"));
    let chats = ardalan.related("chats").unwrap().many();
    assert_eq!(chats.len(), 2);

    let general = chats.iter().find(|c| c.attributes()["name"] == json!("general")).unwrap();
    assert_eq!(general.definition().name(), "Chat");
    assert_eq!(general.related("messages").unwrap().many().len(), 2);
    assert_eq!(general.attributes()["user_id"], json!(ardalan.id().unwrap()));
    assert!(general.id().is_some());
    assert!(!general.is_new());

    let random = chats.iter().find(|c| c.attributes()["name"] == json!("random")).unwrap();
    assert!(random.related("messages").unwrap().many().is_empty());

    let carol = users.iter().find(|u| u.attributes()["username"] == json!("carol")).unwrap();
    assert!(carol.related("chats").unwrap().many().is_empty());

    // serialized form still nests the loaded rows
    let serialized = ardalan.to_json();
    assert_eq!(serialized["chats"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_has_filters_by_related_rows() {
    let (db, _) = database().await;
    seed(&db).await;

    let chats = Chat::has(&db, "messages").get().await.unwrap();
    let mut names: Vec<_> = chats.iter().map(|c| c.attributes()["name"].clone()).collect();
    names.sort_by_key(|n| n.to_string());
    assert_eq!(names, vec![json!("general"), json!("support")]);

    let users = User::has(&db, "chats.messages").get().await.unwrap();
    assert_eq!(usernames(&users), vec!["ardalan", "bob"]);

    let users = User::where_has(&db, "chats.messages", |q| q.where_like("message", "6"))
        .get()
        .await
        .unwrap();
    assert_eq!(usernames(&users), vec!["ardalan"]);

    let users = User::has_count(&db, "chats", Operator::Gte, 2).get().await.unwrap();
    assert_eq!(usernames(&users), vec!["ardalan"]);

    let users = User::query(&db).has_count("chats", Operator::Eq, 0).get().await.unwrap();
    assert_eq!(usernames(&users), vec!["carol"]);

    // count helpers never leak into the result
    assert!(users[0].attributes().keys().all(|key| !key.starts_with("__")));
}

#[tokio::test]
async fn test_trashed_related_rows_are_ignored() {
    let (db, _) = database().await;
    seed(&db).await;

    let mut support = Chat::find_by(&db, "name", "support").await.unwrap().unwrap();
    support.delete(false).await.unwrap();

    let users = User::has(&db, "chats.messages").get().await.unwrap();
    assert_eq!(usernames(&users), vec!["ardalan"]);

    let bob = User::with(&db, &["chats"]).where_eq("username", "bob").first().await.unwrap().unwrap();
    assert!(bob.related("chats").unwrap().many().is_empty());

    support.restore().await.unwrap();
    let users = User::has(&db, "chats.messages").get().await.unwrap();
    assert_eq!(usernames(&users), vec!["ardalan", "bob"]);
}

#[tokio::test]
async fn test_unknown_relation_path_fails() {
    let (db, driver) = database().await;
    seed(&db).await;

    let before = driver.request_count();
    let err = User::with(&db, &["chats.authors"]).get().await.unwrap_err();
    assert!(matches!(err, ModelError::UnknownRelation { ref relation, .. } if relation == "authors"));

    let err = User::has(&db, "followers").count().await.unwrap_err();
    assert!(matches!(err, ModelError::UnknownRelation { .. }));
    assert_eq!(driver.request_count(), before);
}

#[tokio::test]
async fn test_has_one_allows_a_single_row() {
    let (db, _) = database().await;
    let mut users = seed(&db).await;

    assert_ok!(users[0].relation("profile").unwrap().create(json!({ "bio": "first" })).await);
    let err = users[0]
        .relation("profile")
        .unwrap()
        .create(json!({ "bio": "second" }))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ModelError::InvalidRelationOperation(RelationshipError::AlreadyHasOne { .. })
    ));
    assert_eq!(Profile::count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_between_matches_its_expansion() {
    let (db, _) = database().await;
    seed(&db).await;
    for age in [20, 30] {
        User::create(&db, json!({ "username": format!("user{}", age), "age": age })).await.unwrap();
    }

    let between = User::query(&db).where_between("age", 20, 30).get().await.unwrap();
    let expanded = User::query(&db).where_gte("age", 20).where_lte("age", 30).get().await.unwrap();
    assert_eq!(usernames(&between), usernames(&expanded));
    assert_eq!(usernames(&between), vec!["ardalan", "user20", "user30"]);

    let outside = User::query(&db).where_not_between("age", 20, 30).get().await.unwrap();
    let expanded = User::query(&db)
        .where_group(|q| q.where_lt("age", 20).or_where_op("age", Operator::Gt, 30))
        .get()
        .await
        .unwrap();
    assert_eq!(usernames(&outside), usernames(&expanded));
    assert_eq!(usernames(&outside), vec!["bob", "carol"]);
}

#[tokio::test]
async fn test_serialized_rows_revalidate_as_updates() {
    let (db, _) = database().await;
    seed(&db).await;

    for user in User::all(&db).await.unwrap() {
        let serialized = user.to_json();
        let document = serialized.as_object().unwrap();
        assert!(user.definition().validate(document, true).is_ok());
    }
}

#[tokio::test]
async fn test_lean_rows_are_plain_documents() {
    let (db, _) = database().await;
    seed(&db).await;

    let rows = User::query(&db).where_eq("username", "bob").lean().get().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["age"], json!(31));
    assert!(rows[0]["id"].is_string());
    assert!(!rows[0].contains_key("_id"));
}

#[tokio::test]
async fn test_terminal_calls_accept_callbacks() {
    let (db, _) = database().await;
    seed(&db).await;

    let (tx, rx) = oneshot::channel();
    db.query::<User>()
        .where_gt("age", 20)
        .count()
        .on_complete(move |result| {
            let _ = tx.send(result);
        })
        .await
        .unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), 2);
}

#[tokio::test]
async fn test_eager_load_polymorphic_relations() {
    let (db, driver) = database().await;
    let mut post = Post::create(&db, json!({ "title": "hello" })).await.unwrap();
    let mut other = Post::create(&db, json!({ "title": "other" })).await.unwrap();

    post.relation("comments")
        .unwrap()
        .insert(vec![json!({ "body": "first" }), json!({ "body": "second" })])
        .await
        .unwrap();
    post.relation("image").unwrap().create(json!({ "url": "a.png" })).await.unwrap();
    other.relation("comments").unwrap().create(json!({ "body": "elsewhere" })).await.unwrap();

    // a row with the right key but another owner type stays out
    let stray = json!({ "body": "stray", "commentable_id": post.id().unwrap(), "commentable_type": "Video" });
    driver
        .insert("comments", vec![prepare_to_store(stray.as_object().unwrap().clone())])
        .await
        .unwrap();

    let before = driver.request_count();
    let loaded = Post::with(&db, &["comments", "image"])
        .where_eq("title", "hello")
        .first()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(driver.request_count() - before, 1);

    let comments = loaded.related("comments").unwrap().many();
    let mut bodies: Vec<_> = comments.iter().map(|c| c.attributes()["body"].clone()).collect();
    bodies.sort_by_key(|b| b.to_string());
    assert_eq!(bodies, vec![json!("first"), json!("second")]);
    for comment in comments {
        assert_eq!(comment.definition().name(), "Comment");
        assert_eq!(comment.attributes()["commentable_type"], json!("Post"));
        assert_eq!(comment.attributes()["commentable_id"], json!(post.id().unwrap()));
    }

    let image = loaded.related("image").unwrap().one().unwrap();
    assert_eq!(image.attributes()["url"], json!("a.png"));
    assert_eq!(image.attributes()["imageable_type"], json!("Post"));

    let other = Post::with(&db, &["image"]).where_eq("title", "other").first().await.unwrap().unwrap();
    assert!(other.related("image").unwrap().one().is_none());
}

#[tokio::test]
async fn test_eager_load_embedded_references() {
    let (db, _) = database().await;
    let mut post = Post::create(&db, json!({ "title": "tagged" })).await.unwrap();
    Post::create(&db, json!({ "title": "untagged" })).await.unwrap();
    Tag::create(&db, json!({ "name": "unused" })).await.unwrap();

    post.relation("tags").unwrap().create(json!({ "name": "rust" })).await.unwrap();
    post.relation("tags").unwrap().create(json!({ "name": "odm" })).await.unwrap();
    assert_eq!(post.attributes()["tag_ids"].as_array().unwrap().len(), 2);

    let posts = Post::with(&db, &["tags"]).order_by("title", OrderDirection::Asc).get().await.unwrap();
    assert_eq!(posts.len(), 2);

    let mut names: Vec<_> = posts[0]
        .related("tags")
        .unwrap()
        .many()
        .iter()
        .map(|t| t.attributes()["name"].clone())
        .collect();
    names.sort_by_key(|n| n.to_string());
    assert_eq!(names, vec![json!("odm"), json!("rust")]);
    assert!(posts[1].related("tags").unwrap().many().is_empty());

    let posts = Post::has(&db, "tags").get().await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].attributes()["title"], json!("tagged"));
}

#[tokio::test]
async fn test_nested_has_count_compares_first_level_rows() {
    let (db, _) = database().await;
    seed(&db).await;

    // before: ardalan has one chat with messages, bob one
    let users = User::has_count(&db, "chats.messages", Operator::Gte, 2).get().await.unwrap();
    assert!(users.is_empty());

    let mut random = Chat::find_by(&db, "name", "random").await.unwrap().unwrap();
    random.relation("messages").unwrap().create(json!({ "message": "message 3" })).await.unwrap();

    let users = User::has_count(&db, "chats.messages", Operator::Gte, 2).get().await.unwrap();
    assert_eq!(usernames(&users), vec!["ardalan"]);

    let users = User::has_count(&db, "chats.messages", Operator::Lt, 2).get().await.unwrap();
    assert_eq!(usernames(&users), vec!["bob", "carol"]);

    let users = User::query(&db)
        .where_has_count("chats.messages", |q| q.where_like("message", "6"), Operator::Eq, 1)
        .get()
        .await
        .unwrap();
    assert_eq!(usernames(&users), vec!["ardalan"]);
}

#[tokio::test]
async fn test_forced_delete_after_soft_delete() {
    let (db, _) = database().await;
    seed(&db).await;

    let mut support = Chat::find_by(&db, "name", "support").await.unwrap().unwrap();
    support.delete(false).await.unwrap();
    assert!(support.is_trashed());

    assert_eq!(Chat::query(&db).where_eq("name", "support").delete(true).await.unwrap(), 1);
    assert_eq!(Chat::query(&db).with_trashed().where_eq("name", "support").restore().await.unwrap(), 0);
    assert_eq!(Chat::query(&db).with_trashed().count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_iterate_streams_hydrated_rows() {
    let (db, driver) = database().await;
    seed(&db).await;

    let before = driver.request_count();
    let mut stream = User::query(&db).where_gt("age", 20).order_by_desc("age").iterate();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.attributes()["username"], json!("bob"));
    let rest: Vec<ModelInstance> = stream.try_collect().await.unwrap();
    assert_eq!(usernames(&rest), vec!["ardalan"]);
    assert_eq!(driver.request_count() - before, 1);

    let all: Vec<ModelInstance> = User::iterate(&db).try_collect().await.unwrap();
    assert_eq!(all.len(), 3);

    let err = User::with(&db, &["followers"]).iterate().try_collect::<Vec<_>>().await.unwrap_err();
    assert!(matches!(err, ModelError::UnknownRelation { .. }));
}

#[tokio::test]
async fn test_select_projects_fields() {
    let (db, _) = database().await;
    seed(&db).await;

    let rows = User::query(&db).select(&["username"]).order_by("age", OrderDirection::Asc).get().await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].attributes().len(), 1);
    assert_eq!(rows[0].attributes()["username"], json!("carol"));
    assert!(rows[0].id().is_none());

    let row = User::query(&db)
        .where_eq("username", "bob")
        .select(&["id", "age"])
        .lean()
        .first()
        .await
        .unwrap()
        .unwrap();
    assert!(row["id"].is_string());
    assert_eq!(row["age"], json!(31));
    assert!(!row.contains_key("username"));
    assert!(!row.contains_key("_id"));

    // projection runs after eager loading, so loaded relations can be kept
    let rows = User::with(&db, &["chats"]).where_eq("username", "ardalan").select(&["chats"]).get().await.unwrap();
    assert!(!rows[0].attributes().contains_key("username"));
    assert_eq!(rows[0].related("chats").unwrap().many().len(), 2);
}

#[tokio::test]
async fn test_lifecycle_events() {
    let (db, _) = database().await;
    let created = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let counter = Arc::clone(&created);
    User::on(&db, ModelEvent::Created, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    for event in [ModelEvent::Updated, ModelEvent::Deleted] {
        let seen = Arc::clone(&seen);
        User::on(&db, event, move |user| {
            let name = user.attributes()["username"].as_str().unwrap_or_default().to_string();
            seen.lock().unwrap().push(format!("{}:{}", event, name));
        });
    }

    let mut user = User::create(&db, json!({ "username": "dave" })).await.unwrap();
    let mut other = db.instance::<User>();
    other.set_attribute("username", "erin");
    other.save().await.unwrap();
    User::insert(&db, vec![json!({ "username": "frank" })]).await.unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 2);

    user.set_attribute("age", 40);
    user.save().await.unwrap();
    user.delete(true).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["updated:dave", "deleted:dave"]);

    // other models are unaffected
    Chat::create(&db, json!({ "name": "lobby" })).await.unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 2);
}
