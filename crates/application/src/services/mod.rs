mod question_service;
mod room_lifecycle;

pub use question_service::{MatchResponse, QuestionService, QuestionServiceDependencies};
pub use room_lifecycle::{
    CreatedRoom, HistoryPage, RoomLifecycleDependencies, RoomLifecycleService,
};
