//! Diagnostic Session State Machine
//!
//! Drives a student's diagnostic interview for one learning goal:
//!
//! ```text
//! NOT_STARTED --start--> ACTIVE --first answers--> ACTIVE (follow-ups) --follow-up answers--> FINISHED
//!                           \--finish (any time)-------------------------------------------/
//! ```
//!
//! A session is bound at creation to one client protocol. `Batch` sessions get
//! every first question up front and one round of follow-ups; `Stepwise`
//! sessions walk the topics one templated question at a time. Calls belonging
//! to the other protocol are rejected.
//!
//! Every transition re-derives the session from (session id, student id), so a
//! session owned by someone else looks exactly like a missing one.

use anyhow::Context;
use futures_util::future::join_all;
use mentor_core::{
    classifier::{ClassificationInput, KnowledgeClassifier},
    curriculum::{CurriculumService, GoalBrief},
    diagnostic::{DISCLAIMER, INTRO, MAX_FOLLOWUPS_PER_TOPIC, ProtocolVariant, template_question},
    followup::{FollowupGenerator, FollowupRequest, cap_questions},
    label::KnowledgeLabel,
    lesson,
    roadmap::{LabeledTopic, suggest_roadmap, summarize},
    topic::TopicDraft,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DiagnosticStore,
    models::{
        DiagnosticDone, DiagnosticSession, DiagnosticTurn, FinishResponse, FirstAnswer,
        FollowupItem, InitialQuestion, LatestSummaryResponse, LearningGoal, NewTurn, NextQuestion,
        NextStep, SessionDetails, StartDiagnosticResponse, Topic, TopicFollowups,
    },
    ws::hub::{Notification, NotificationHub},
};

pub const DEFAULT_GENERATED_TOPICS: usize = 6;
pub const MAX_GENERATED_TOPICS: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    /// The session is not in a state that allows the operation.
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = DiagnosticError> = std::result::Result<T, E>;

/// The collaborators the state machine coordinates.
pub struct DiagnosticService {
    store: Arc<dyn DiagnosticStore>,
    classifier: Arc<dyn KnowledgeClassifier>,
    followups: Arc<dyn FollowupGenerator>,
    curriculum: Arc<dyn CurriculumService>,
    hub: Arc<dyn NotificationHub>,
}

impl DiagnosticService {
    pub fn new(
        store: Arc<dyn DiagnosticStore>,
        classifier: Arc<dyn KnowledgeClassifier>,
        followups: Arc<dyn FollowupGenerator>,
        curriculum: Arc<dyn CurriculumService>,
        hub: Arc<dyn NotificationHub>,
    ) -> Self {
        Self {
            store,
            classifier,
            followups,
            curriculum,
            hub,
        }
    }

    /// Starts a diagnostic for the student, or resumes the active one.
    #[instrument(skip(self), fields(session_id))]
    pub async fn start(
        &self,
        student_id: &str,
        goal_id: Uuid,
        protocol: Option<ProtocolVariant>,
    ) -> Result<StartDiagnosticResponse> {
        let goal = self
            .store
            .get_goal(goal_id)
            .await?
            .filter(|g| g.student_id == student_id)
            .ok_or_else(|| DiagnosticError::NotFound("Learning goal not found".to_string()))?;

        let topics = self.resolve_topics(&goal).await?;
        let (session, created) = self
            .store
            .create_or_resume_session(goal.id, student_id, protocol.unwrap_or_default())
            .await?;
        tracing::Span::current().record("session_id", tracing::field::display(session.id));

        if created {
            info!(protocol = %session.protocol, topics = topics.len(), "Diagnostic session created");
        } else {
            info!(protocol = %session.protocol, "Resuming active diagnostic session");
        }

        let initial_questions = match session.protocol {
            ProtocolVariant::Batch => topics
                .iter()
                .map(|t| InitialQuestion {
                    topic_id: t.id,
                    title: t.title.clone(),
                    first_question: question_for(t),
                })
                .collect(),
            ProtocolVariant::Stepwise => Vec::new(),
        };

        Ok(StartDiagnosticResponse {
            session_id: session.id,
            intro: INTRO.to_string(),
            disclaimer: DISCLAIMER.to_string(),
            protocol: session.protocol,
            total_topics: topics.len(),
            initial_questions,
        })
    }

    pub async fn get(&self, student_id: &str, session_id: Uuid) -> Result<SessionDetails> {
        let session = self.owned_session(student_id, session_id).await?;
        let total_topics = self.store.list_topics(session.goal_id).await?.len();
        Ok(SessionDetails {
            session,
            total_topics,
        })
    }

    /// Stepwise protocol: the question for the topic under the cursor. Moves nothing.
    pub async fn next_question(&self, student_id: &str, session_id: Uuid) -> Result<NextStep> {
        let session = self.owned_session(student_id, session_id).await?;
        expect_protocol(&session, ProtocolVariant::Stepwise)?;

        let topics = self.store.list_topics(session.goal_id).await?;
        let index = cursor(&session);
        if !session.is_active() || index >= topics.len() {
            return Ok(NextStep::Done(DiagnosticDone { done: true }));
        }

        let topic = &topics[index];
        Ok(NextStep::Question(NextQuestion {
            topic_id: topic.id,
            question: template_question(&topic.title),
            index,
            total: topics.len(),
        }))
    }

    /// Stepwise protocol: records the answer for the topic under the cursor and
    /// moves the cursor forward by one.
    #[instrument(skip(self, answer))]
    pub async fn answer(
        &self,
        student_id: &str,
        session_id: Uuid,
        answer: &str,
    ) -> Result<DiagnosticTurn> {
        let session = self.owned_session(student_id, session_id).await?;
        expect_protocol(&session, ProtocolVariant::Stepwise)?;
        expect_active(&session)?;
        let answer = non_blank(answer, "answer")?;

        let goal = self.goal_of(&session).await?;
        let topics = self.store.list_topics(session.goal_id).await?;
        let index = cursor(&session);
        let topic = topics.get(index).ok_or_else(|| {
            DiagnosticError::Conflict("All topics have already been answered".to_string())
        })?;

        let question = template_question(&topic.title);
        let label = self
            .classify(&topic.title, &question, answer, &goal.language)
            .await;
        let mut stored = self
            .store
            .record_turns(
                session.id,
                &[NewTurn {
                    topic_id: topic.id,
                    topic_title: topic.title.clone(),
                    question_text: question,
                    student_answer: answer.to_string(),
                    ai_label: label,
                }],
            )
            .await?;
        let session = self
            .store
            .advance_cursor(session.id, topics.len() as i32)
            .await?;

        info!(topic_id = %topic.id, %label, cursor = session.current_idx, "Stepwise answer recorded");
        stored
            .pop()
            .context("Store returned no turn for a single insert")
            .map_err(DiagnosticError::from)
    }

    /// Batch protocol, phase one: classifies and records the answers to the
    /// first questions, then asks the follow-up generator about every topic
    /// that was not answered excellently.
    #[instrument(skip(self, answers), fields(answers = answers.len()))]
    pub async fn submit_first_answers(
        &self,
        student_id: &str,
        session_id: Uuid,
        answers: &[FirstAnswer],
    ) -> Result<Vec<TopicFollowups>> {
        let session = self.owned_session(student_id, session_id).await?;
        expect_protocol(&session, ProtocolVariant::Batch)?;
        expect_active(&session)?;
        if answers.is_empty() {
            return Err(DiagnosticError::Validation(
                "answers must not be empty".to_string(),
            ));
        }

        let goal = self.goal_of(&session).await?;
        let topics = self.topics_by_id(session.goal_id).await?;

        let mut pending = Vec::with_capacity(answers.len());
        for item in answers {
            let topic = lookup_topic(&topics, item.topic_id)?;
            let answer = non_blank(&item.answer, "answer")?;
            pending.push((topic, question_for(topic), answer));
        }

        let labels = join_all(pending.iter().map(|(topic, question, answer)| {
            self.classify(&topic.title, question, answer, &goal.language)
        }))
        .await;

        let new_turns: Vec<NewTurn> = pending
            .iter()
            .zip(labels)
            .map(|((topic, question, answer), label)| NewTurn {
                topic_id: topic.id,
                topic_title: topic.title.clone(),
                question_text: question.clone(),
                student_answer: answer.to_string(),
                ai_label: label,
            })
            .collect();
        let stored = self.store.record_turns(session.id, &new_turns).await?;

        let mut needs_followup: Vec<&DiagnosticTurn> = Vec::new();
        for turn in stored.iter().filter(|t| t.ai_label != KnowledgeLabel::Excellent) {
            if !needs_followup.iter().any(|t| t.topic_id == turn.topic_id) {
                needs_followup.push(turn);
            }
        }

        if needs_followup.is_empty() {
            info!("Every first answer was excellent; no follow-ups needed");
            return Ok(Vec::new());
        }

        let requests: Vec<FollowupRequest> = needs_followup
            .iter()
            .map(|t| FollowupRequest {
                topic_title: t.topic_title.clone(),
                first_question: t.question_text.clone(),
                first_answer: t.student_answer.clone(),
            })
            .collect();
        let questions = self
            .followups
            .generate(&requests, &goal.language, MAX_FOLLOWUPS_PER_TOPIC)
            .await;

        let followups: Vec<TopicFollowups> = needs_followup
            .iter()
            .zip(questions.into_iter().chain(std::iter::repeat_with(Vec::new)))
            .map(|(turn, questions)| TopicFollowups {
                topic_id: turn.topic_id,
                questions: cap_questions(questions, MAX_FOLLOWUPS_PER_TOPIC),
            })
            .collect();

        info!(
            topics = followups.len(),
            questions = followups.iter().map(|f| f.questions.len()).sum::<usize>(),
            "First answers recorded"
        );
        Ok(followups)
    }

    /// Batch protocol, phase two: records the follow-up answers and finishes
    /// the session. An empty `items` list simply finishes it.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn submit_followup_answers(
        &self,
        student_id: &str,
        session_id: Uuid,
        items: &[FollowupItem],
    ) -> Result<FinishResponse> {
        let session = self.owned_session(student_id, session_id).await?;
        expect_protocol(&session, ProtocolVariant::Batch)?;
        expect_active(&session)?;

        let topics = self.topics_by_id(session.goal_id).await?;
        let mut pending = Vec::new();
        for item in items {
            let topic = lookup_topic(&topics, item.topic_id)?;
            for qa in &item.qa {
                let question = non_blank(&qa.question, "question")?;
                let answer = non_blank(&qa.answer, "answer")?;
                pending.push((topic, question, answer));
            }
        }

        if !pending.is_empty() {
            let goal = self.goal_of(&session).await?;
            let labels = join_all(pending.iter().map(|(topic, question, answer)| {
                self.classify(&topic.title, question, answer, &goal.language)
            }))
            .await;

            let new_turns: Vec<NewTurn> = pending
                .iter()
                .zip(labels)
                .map(|((topic, question, answer), label)| NewTurn {
                    topic_id: topic.id,
                    topic_title: topic.title.clone(),
                    question_text: question.to_string(),
                    student_answer: answer.to_string(),
                    ai_label: label,
                })
                .collect();
            self.store.record_turns(session.id, &new_turns).await?;
            info!(turns = new_turns.len(), "Follow-up answers recorded");
        }

        self.complete(session).await
    }

    /// Finishes the session (idempotently) and reports on whatever was answered.
    #[instrument(skip(self))]
    pub async fn finish(&self, student_id: &str, session_id: Uuid) -> Result<FinishResponse> {
        let session = self.owned_session(student_id, session_id).await?;
        self.complete(session).await
    }

    /// Teacher view: summary of the most recently finished session of a goal.
    pub async fn latest_summary(
        &self,
        teacher_id: &str,
        goal_id: Uuid,
    ) -> Result<LatestSummaryResponse> {
        let goal = self.teacher_goal(teacher_id, goal_id).await?;
        let Some(session) = self.store.latest_finished_session(goal.id).await? else {
            return Ok(LatestSummaryResponse {
                exists: false,
                session_id: None,
                summary: None,
                suggested_roadmap: None,
            });
        };

        let report = report(&self.store.list_turns(session.id).await?);
        Ok(LatestSummaryResponse {
            exists: true,
            session_id: Some(session.id),
            summary: Some(report.summary),
            suggested_roadmap: Some(report.suggested_roadmap),
        })
    }

    /// Teacher view: AI-proposed topics for a goal. Nothing is persisted.
    #[instrument(skip(self))]
    pub async fn generate_topics(
        &self,
        teacher_id: &str,
        goal_id: Uuid,
        count: Option<usize>,
    ) -> Result<Vec<TopicDraft>> {
        let goal = self.teacher_goal(teacher_id, goal_id).await?;
        let count = count
            .unwrap_or(DEFAULT_GENERATED_TOPICS)
            .clamp(1, MAX_GENERATED_TOPICS);

        let topics = self
            .curriculum
            .generate_topics(
                GoalBrief {
                    title: &goal.title,
                    description: goal.description.as_deref(),
                    language: &goal.language,
                },
                count,
            )
            .await
            .context("Topic generation failed")?;
        Ok(topics)
    }

    async fn complete(&self, session: DiagnosticSession) -> Result<FinishResponse> {
        let (session, transitioned) = self.store.finish_session(session.id).await?;
        let turns = self.store.list_turns(session.id).await?;
        let response = report(&turns);

        if transitioned {
            info!(session_id = %session.id, turns = turns.len(), "Diagnostic session finished");
            match self.store.get_goal(session.goal_id).await {
                Ok(Some(goal)) => self.hub.publish(
                    &goal.teacher_id,
                    Notification::DiagnosticFinished {
                        goal_id: goal.id,
                        session_id: session.id,
                        student_id: session.student_id.clone(),
                        summary: response.summary.clone(),
                    },
                ),
                Ok(None) => warn!(goal_id = %session.goal_id, "Finished session has no goal"),
                Err(e) => warn!(error = %e, "Could not load goal for notification"),
            }
        }
        Ok(response)
    }

    async fn classify(
        &self,
        topic_title: &str,
        question: &str,
        answer: &str,
        language: &str,
    ) -> KnowledgeLabel {
        self.classifier
            .classify(ClassificationInput {
                topic_title,
                question,
                answer,
                language,
            })
            .await
    }

    /// Topics of the goal, backfilled from its diagnostic lesson if none exist yet.
    async fn resolve_topics(&self, goal: &LearningGoal) -> Result<Vec<Topic>> {
        let topics = self.store.list_topics(goal.id).await?;
        if !topics.is_empty() {
            return Ok(topics);
        }

        let drafts = goal
            .diagnostic_lesson
            .as_deref()
            .map(lesson::extract_topics)
            .unwrap_or_default();
        if drafts.is_empty() {
            return Err(DiagnosticError::Validation(
                "This learning goal has no diagnostic topics yet".to_string(),
            ));
        }

        info!(goal_id = %goal.id, topics = drafts.len(), "Backfilling topics from diagnostic lesson");
        Ok(self.store.insert_topics_if_none(goal.id, &drafts).await?)
    }

    async fn owned_session(&self, student_id: &str, session_id: Uuid) -> Result<DiagnosticSession> {
        self.store
            .get_session(session_id, student_id)
            .await?
            .ok_or_else(|| DiagnosticError::NotFound("Diagnostic session not found".to_string()))
    }

    async fn teacher_goal(&self, teacher_id: &str, goal_id: Uuid) -> Result<LearningGoal> {
        self.store
            .get_goal(goal_id)
            .await?
            .filter(|g| g.teacher_id == teacher_id)
            .ok_or_else(|| DiagnosticError::NotFound("Learning goal not found".to_string()))
    }

    async fn goal_of(&self, session: &DiagnosticSession) -> Result<LearningGoal> {
        Ok(self
            .store
            .get_goal(session.goal_id)
            .await?
            .context("Session refers to a missing learning goal")?)
    }

    async fn topics_by_id(&self, goal_id: Uuid) -> Result<HashMap<Uuid, Topic>> {
        Ok(self
            .store
            .list_topics(goal_id)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect())
    }
}

/// Summary and suggested roadmap of a set of turns.
pub fn report(turns: &[DiagnosticTurn]) -> FinishResponse {
    let labeled = || {
        turns.iter().map(|t| LabeledTopic {
            topic_title: &t.topic_title,
            label: t.ai_label,
        })
    };
    FinishResponse {
        finished: true,
        summary: summarize(labeled()),
        suggested_roadmap: suggest_roadmap(labeled()),
    }
}

/// The question shown for a topic in the batch protocol.
fn question_for(topic: &Topic) -> String {
    topic
        .first_question
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| template_question(&topic.title))
}

fn cursor(session: &DiagnosticSession) -> usize {
    usize::try_from(session.current_idx).unwrap_or(0)
}

fn expect_protocol(session: &DiagnosticSession, expected: ProtocolVariant) -> Result<()> {
    if session.protocol == expected {
        Ok(())
    } else {
        Err(DiagnosticError::Conflict(format!(
            "This session uses the {} protocol",
            session.protocol
        )))
    }
}

fn expect_active(session: &DiagnosticSession) -> Result<()> {
    if session.is_active() {
        Ok(())
    } else {
        Err(DiagnosticError::Conflict(
            "This diagnostic session is already finished".to_string(),
        ))
    }
}

fn non_blank<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(DiagnosticError::Validation(format!(
            "{} must not be empty",
            field
        )))
    } else {
        Ok(trimmed)
    }
}

fn lookup_topic(topics: &HashMap<Uuid, Topic>, topic_id: Uuid) -> Result<&Topic> {
    topics.get(&topic_id).ok_or_else(|| {
        DiagnosticError::Validation(format!(
            "Topic {} is not part of this learning goal",
            topic_id
        ))
    })
}
