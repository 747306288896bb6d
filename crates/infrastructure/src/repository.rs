use application::repository::{
    MessageRepository, ParticipantRepository, QuestionRepository, RoomRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ExpertMatch, MatchStatus, Message, MessageContent, MessageId, MessageKind, Participant,
    Question, QuestionId, QuestionStatus, RepositoryError, Room, RoomId, RoomStatus, UserId,
    UserRole,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn parse_column<T>(
    column: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(value).ok_or_else(|| invalid_data(format!("unexpected {column}: {value}")))
}

#[derive(Debug, FromRow)]
struct QuestionRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<QuestionRecord> for Question {
    type Error = RepositoryError;

    fn try_from(value: QuestionRecord) -> Result<Self, Self::Error> {
        Ok(Question {
            id: QuestionId::from(value.id),
            owner_id: UserId::from(value.owner_id),
            title: value.title,
            status: parse_column("question status", &value.status, QuestionStatus::parse)?,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MatchRecord {
    question_id: Uuid,
    expert_id: Uuid,
    status: String,
    responded_at: Option<DateTime<Utc>>,
}

impl TryFrom<MatchRecord> for ExpertMatch {
    type Error = RepositoryError;

    fn try_from(value: MatchRecord) -> Result<Self, Self::Error> {
        Ok(ExpertMatch {
            question_id: QuestionId::from(value.question_id),
            expert_id: UserId::from(value.expert_id),
            status: parse_column("match status", &value.status, MatchStatus::parse)?,
            responded_at: value.responded_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    question_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RoomRecord> for Room {
    type Error = RepositoryError;

    fn try_from(value: RoomRecord) -> Result<Self, Self::Error> {
        Ok(Room {
            id: RoomId::from(value.id),
            question_id: QuestionId::from(value.question_id),
            status: parse_column("room status", &value.status, RoomStatus::parse)?,
            created_at: value.created_at,
            closed_at: value.closed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    room_id: Uuid,
    user_id: Uuid,
    role: String,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
}

impl TryFrom<ParticipantRecord> for Participant {
    type Error = RepositoryError;

    fn try_from(value: ParticipantRecord) -> Result<Self, Self::Error> {
        Ok(Participant {
            room_id: RoomId::from(value.room_id),
            user_id: UserId::from(value.user_id),
            role: parse_column("participant role", &value.role, UserRole::parse)?,
            joined_at: value.joined_at,
            left_at: value.left_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    room_id: Uuid,
    id: i64,
    sender_id: Uuid,
    content: String,
    kind: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let id = u64::try_from(value.id).map_err(|_| invalid_data("negative message id"))?;
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message::new(
            MessageId::new(id),
            RoomId::from(value.room_id),
            UserId::from(value.sender_id),
            content,
            parse_column("message kind", &value.kind, MessageKind::parse)?,
            value.created_at,
        ))
    }
}

fn message_id_param(id: MessageId) -> Result<i64, RepositoryError> {
    i64::try_from(id.value()).map_err(|_| invalid_data("message id out of range"))
}

/// PostgreSQL 存储，实现全部存储契约
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert_question(&self, question: &Question) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO questions (id, owner_id, title, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::from(question.id))
        .bind(Uuid::from(question.owner_id))
        .bind(&question.title)
        .bind(question.status.as_str())
        .bind(question.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    pub async fn insert_match(&self, expert_match: &ExpertMatch) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO expert_matches (question_id, expert_id, status, responded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::from(expert_match.question_id))
        .bind(Uuid::from(expert_match.expert_id))
        .bind(expert_match.status.as_str())
        .bind(expert_match.responded_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl QuestionRepository for PgStore {
    async fn find_by_id(&self, id: QuestionId) -> Result<Option<Question>, RepositoryError> {
        let record = sqlx::query_as::<_, QuestionRecord>(
            r#"
            SELECT id, owner_id, title, status, created_at
            FROM questions
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Question::try_from).transpose()
    }

    async fn update(&self, question: Question) -> Result<Question, RepositoryError> {
        let record = sqlx::query_as::<_, QuestionRecord>(
            r#"
            UPDATE questions
            SET title = $2, status = $3
            WHERE id = $1
            RETURNING id, owner_id, title, status, created_at
            "#,
        )
        .bind(Uuid::from(question.id))
        .bind(&question.title)
        .bind(question.status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Question::try_from(record)
    }

    async fn find_match(
        &self,
        question_id: QuestionId,
        expert_id: UserId,
    ) -> Result<Option<ExpertMatch>, RepositoryError> {
        let record = sqlx::query_as::<_, MatchRecord>(
            r#"
            SELECT question_id, expert_id, status, responded_at
            FROM expert_matches
            WHERE question_id = $1 AND expert_id = $2
            "#,
        )
        .bind(Uuid::from(question_id))
        .bind(Uuid::from(expert_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(ExpertMatch::try_from).transpose()
    }

    async fn update_match(
        &self,
        expert_match: ExpertMatch,
    ) -> Result<ExpertMatch, RepositoryError> {
        let record = sqlx::query_as::<_, MatchRecord>(
            r#"
            UPDATE expert_matches
            SET status = $3, responded_at = $4
            WHERE question_id = $1 AND expert_id = $2
            RETURNING question_id, expert_id, status, responded_at
            "#,
        )
        .bind(Uuid::from(expert_match.question_id))
        .bind(Uuid::from(expert_match.expert_id))
        .bind(expert_match.status.as_str())
        .bind(expert_match.responded_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        ExpertMatch::try_from(record)
    }

    async fn list_accepted_experts(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<UserId>, RepositoryError> {
        let experts: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT expert_id
            FROM expert_matches
            WHERE question_id = $1 AND status = 'accepted'
            ORDER BY expert_id
            "#,
        )
        .bind(Uuid::from(question_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(experts.into_iter().map(UserId::from).collect())
    }
}

#[async_trait]
impl RoomRepository for PgStore {
    async fn create_with_participants(
        &self,
        room: Room,
        participants: Vec<Participant>,
    ) -> Result<Room, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO rooms (id, question_id, status, created_at, closed_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, question_id, status, created_at, closed_at
            "#,
        )
        .bind(Uuid::from(room.id))
        .bind(Uuid::from(room.question_id))
        .bind(room.status.as_str())
        .bind(room.created_at)
        .bind(room.closed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        for participant in &participants {
            sqlx::query(
                r#"
                INSERT INTO participants (room_id, user_id, role, joined_at, left_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::from(participant.room_id))
            .bind(Uuid::from(participant.user_id))
            .bind(participant.role.as_str())
            .bind(participant.joined_at)
            .bind(participant.left_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        let updated = sqlx::query("UPDATE questions SET status = 'in_progress' WHERE id = $1")
            .bind(Uuid::from(room.question_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Room::try_from(record)
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, question_id, status, created_at, closed_at
            FROM rooms
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Room::try_from).transpose()
    }

    async fn find_active_by_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Option<Room>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, question_id, status, created_at, closed_at
            FROM rooms
            WHERE question_id = $1 AND status = 'active'
            "#,
        )
        .bind(Uuid::from(question_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Room::try_from).transpose()
    }

    async fn close(&self, room: Room) -> Result<Room, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            UPDATE rooms
            SET status = $2, closed_at = $3
            WHERE id = $1
            RETURNING id, question_id, status, created_at, closed_at
            "#,
        )
        .bind(Uuid::from(room.id))
        .bind(room.status.as_str())
        .bind(room.closed_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query("UPDATE questions SET status = 'resolved' WHERE id = $1")
            .bind(Uuid::from(room.question_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Room::try_from(record)
    }
}

#[async_trait]
impl ParticipantRepository for PgStore {
    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT room_id, user_id, role, joined_at, left_at
            FROM participants
            WHERE room_id = $1 AND user_id = $2
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Participant::try_from).transpose()
    }

    async fn upsert(&self, participant: Participant) -> Result<Participant, RepositoryError> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            INSERT INTO participants (room_id, user_id, role, joined_at, left_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (room_id, user_id)
            DO UPDATE SET role = EXCLUDED.role, left_at = EXCLUDED.left_at
            RETURNING room_id, user_id, role, joined_at, left_at
            "#,
        )
        .bind(Uuid::from(participant.room_id))
        .bind(Uuid::from(participant.user_id))
        .bind(participant.role.as_str())
        .bind(participant.joined_at)
        .bind(participant.left_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Participant::try_from(record)
    }

    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<Participant>, RepositoryError> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT room_id, user_id, role, joined_at, left_at
            FROM participants
            WHERE room_id = $1
            ORDER BY joined_at
            "#,
        )
        .bind(Uuid::from(room_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Participant::try_from).collect()
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (room_id, id, sender_id, content, kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING room_id, id, sender_id, content, kind, created_at
            "#,
        )
        .bind(Uuid::from(message.room_id))
        .bind(message_id_param(message.id)?)
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.kind.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn last_message_id(&self, room_id: RoomId) -> Result<Option<MessageId>, RepositoryError> {
        let last: Option<i64> =
            sqlx::query_scalar("SELECT MAX(id) FROM messages WHERE room_id = $1")
                .bind(Uuid::from(room_id))
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        last.map(|id| {
            u64::try_from(id)
                .map(MessageId::new)
                .map_err(|_| invalid_data("negative message id"))
        })
        .transpose()
    }

    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let before = before.map(message_id_param).transpose()?;
        let mut records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT room_id, id, sender_id, content, kind, created_at
            FROM messages
            WHERE room_id = $1 AND ($2::BIGINT IS NULL OR id < $2)
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.reverse();
        records.into_iter().map(Message::try_from).collect()
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
