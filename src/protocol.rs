//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{AssessmentQuestions, DiscussionTurn, GradeResult, Language, SessionConfig};
use crate::session::{ReviewView, SessionRecord, SessionSnapshot};

/// Messages the client can send over WebSocket. A socket drives one session.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    NewSession,
    Resume {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Start {
        config: SessionConfig,
    },
    Discuss {
        question: String,
    },
    BeginCoding,
    EditCode {
        code: String,
    },
    Hint,
    Run {
        #[serde(default)]
        stdin: String,
    },
    SubmitCode,
    SubmitAnswers {
        answers: Vec<String>,
    },
    Review,
    Reset,
    Record,
    /// Rebuild a session from its flat record and bind the socket to it.
    Restore {
        record: SessionRecord,
    },
    State,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
        state: SessionSnapshot,
    },
    Turn {
        index: usize,
        turn: DiscussionTurn,
    },
    Hint {
        text: String,
    },
    RunResult {
        output: String,
    },
    Questions {
        questions: AssessmentQuestions,
    },
    Review {
        review: ReviewView,
    },
    Record {
        record: SessionRecord,
    },
    Ok,
    Error {
        message: String,
        retryable: bool,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_id: String,
    pub state: SessionSnapshot,
}

#[derive(Deserialize)]
pub struct DiscussIn {
    pub question: String,
}
#[derive(Serialize)]
pub struct TurnOut {
    pub index: usize,
    pub turn: DiscussionTurn,
}

#[derive(Deserialize)]
pub struct CodeIn {
    pub code: String,
}

#[derive(Serialize)]
pub struct HintOut {
    pub hint: String,
}

#[derive(Deserialize, Default)]
pub struct RunIn {
    #[serde(default)]
    pub stdin: String,
}

/// Stand-alone execution, not tied to a session.
#[derive(Deserialize)]
pub struct RunCodeIn {
    pub code: String,
    pub language: Language,
    #[serde(default)]
    pub stdin: String,
}
#[derive(Serialize)]
pub struct RunOut {
    pub output: String,
}

#[derive(Serialize)]
pub struct QuestionsOut {
    pub questions: AssessmentQuestions,
}

#[derive(Deserialize)]
pub struct AnswersIn {
    pub answers: Vec<String>,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOut {
    pub grade: GradeResult,
    pub review: ReviewView,
}

#[derive(Deserialize, Debug, Default)]
pub struct ReviewQuery {
    pub format: Option<String>,
}

#[derive(Serialize)]
pub struct RecordOut {
    pub record: SessionRecord,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub llm: bool,
}
