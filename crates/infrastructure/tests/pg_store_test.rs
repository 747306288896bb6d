//! PostgreSQL 存储集成测试
//!
//! 需要可用的数据库：`DATABASE_URL=postgres://... cargo test -- --ignored`

use application::{MessageRepository, ParticipantRepository, QuestionRepository, RoomRepository};
use chrono::Utc;
use domain::{
    ExpertMatch, MatchStatus, Message, MessageContent, MessageId, MessageKind, Participant,
    Question, QuestionId, QuestionStatus, RepositoryError, Room, RoomId, UserId, UserRole,
};
use infrastructure::{create_pg_pool, PgStore, MIGRATOR};

async fn store() -> PgStore {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = create_pg_pool(&database_url, 5).await.expect("pool");
    MIGRATOR.run(&pool).await.expect("migrations");
    PgStore::new(pool)
}

async fn matched_question(store: &PgStore, owner: UserId, experts: &[UserId]) -> QuestionId {
    let mut question = Question::new(QuestionId::generate(), owner, "lifetimes", Utc::now());
    question.status = QuestionStatus::Matched;
    store.insert_question(&question).await.expect("insert question");
    for expert in experts {
        let mut expert_match = ExpertMatch::pending(question.id, *expert);
        expert_match.status = MatchStatus::Accepted;
        expert_match.responded_at = Some(Utc::now());
        store.insert_match(&expert_match).await.expect("insert match");
    }
    question.id
}

fn text(room_id: RoomId, id: u64, sender: UserId, content: &str) -> Message {
    Message::new(
        MessageId::new(id),
        room_id,
        sender,
        MessageContent::new(content).unwrap(),
        MessageKind::Text,
        Utc::now(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires DATABASE_URL"]
async fn room_lifecycle_round_trip() {
    let store = store().await;
    let owner = UserId::generate();
    let expert = UserId::generate();
    let question_id = matched_question(&store, owner, &[expert]).await;

    assert_eq!(
        store.list_accepted_experts(question_id).await.unwrap(),
        vec![expert]
    );

    let now = Utc::now();
    let room = Room::open(RoomId::generate(), question_id, now);
    let participants = vec![
        Participant::new(room.id, owner, UserRole::Questioner, now),
        Participant::new(room.id, expert, UserRole::Expert, now),
    ];
    let created = store
        .create_with_participants(room.clone(), participants)
        .await
        .expect("create room");
    assert!(created.is_active());

    let question = QuestionRepository::find_by_id(&store, question_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(question.status, QuestionStatus::InProgress);

    // 同一问题只能有一个活跃房间
    let duplicate = Room::open(RoomId::generate(), question_id, now);
    assert_eq!(
        store.create_with_participants(duplicate, Vec::new()).await,
        Err(RepositoryError::Conflict)
    );
    assert_eq!(
        store.find_active_by_question(question_id).await.unwrap().map(|r| r.id),
        Some(room.id)
    );

    let mut left = store.find(room.id, expert).await.unwrap().unwrap();
    left.leave(Utc::now());
    store.upsert(left).await.unwrap();
    assert!(!store.find(room.id, expert).await.unwrap().unwrap().is_present());
    assert_eq!(store.list_by_room(room.id).await.unwrap().len(), 2);

    let mut closing = created;
    closing.close(Utc::now()).unwrap();
    let closed = store.close(closing).await.unwrap();
    assert!(!closed.is_active());
    assert!(store.find_active_by_question(question_id).await.unwrap().is_none());
    let question = QuestionRepository::find_by_id(&store, question_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(question.status, QuestionStatus::Resolved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires DATABASE_URL"]
async fn messages_keep_room_sequence() {
    let store = store().await;
    let owner = UserId::generate();
    let question_id = matched_question(&store, owner, &[]).await;
    let now = Utc::now();
    let room = Room::open(RoomId::generate(), question_id, now);
    store
        .create_with_participants(
            room.clone(),
            vec![Participant::new(room.id, owner, UserRole::Questioner, now)],
        )
        .await
        .unwrap();

    assert_eq!(store.last_message_id(room.id).await.unwrap(), None);
    for id in 1..=5 {
        store
            .insert(text(room.id, id, owner, &format!("message {id}")))
            .await
            .unwrap();
    }

    // 重复序号被唯一键拒绝
    assert_eq!(
        store.insert(text(room.id, 3, owner, "again")).await,
        Err(RepositoryError::Conflict)
    );
    assert_eq!(
        store.last_message_id(room.id).await.unwrap(),
        Some(MessageId::new(5))
    );

    let page = store.list_recent(room.id, 2, None).await.unwrap();
    let ids: Vec<u64> = page.iter().map(|m| m.id.value()).collect();
    assert_eq!(ids, vec![4, 5]);

    let page = store
        .list_recent(room.id, 10, Some(MessageId::new(3)))
        .await
        .unwrap();
    let ids: Vec<u64> = page.iter().map(|m| m.id.value()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(page[0].content.as_str(), "message 1");
}
