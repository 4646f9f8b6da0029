//! Read access to quizzes and their questions
//!
//! Quiz authoring lives outside of this crate. The state machine only needs
//! to resolve a quiz's ordered question sequence once when a session is
//! created, and to look questions up by id afterwards. [`MemoryCatalog`] is a
//! complete in-process implementation used by tests and small deployments.

use std::sync::{PoisonError, RwLock};

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{error::StoreError, identity::Id, question::Question};

/// The quiz metadata the state machine needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    /// Unique identifier of the quiz
    pub id: Id,
    /// The host that owns the quiz
    pub host_id: Id,
    /// Display title
    pub title: String,
}

/// Read-only source of quizzes and questions
pub trait Catalog: Send + Sync {
    /// Looks up a quiz by id
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing source fails.
    fn quiz(&self, quiz_id: Id) -> Result<Option<Quiz>, StoreError>;

    /// Returns the quiz's questions in play order
    ///
    /// Categorized questions come first, ordered by category and then by
    /// question position; uncategorized questions follow by position.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing source fails.
    fn questions(&self, quiz_id: Id) -> Result<Vec<Question>, StoreError>;

    /// Looks up a single question by id
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing source fails.
    fn question(&self, question_id: Id) -> Result<Option<Question>, StoreError>;
}

/// Reasons content is refused by [`MemoryCatalog`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The quiz does not exist
    #[error("unknown quiz")]
    UnknownQuiz,
    /// The category does not exist or belongs to another quiz
    #[error("unknown category")]
    UnknownCategory,
    /// The question does not exist
    #[error("unknown question")]
    UnknownQuestion,
    /// The question failed content validation
    #[error("invalid question: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
struct Category {
    id: Id,
    quiz_id: Id,
    title: String,
    order_num: i32,
}

#[derive(Debug, Clone)]
struct Entry {
    quiz_id: Id,
    category_id: Option<Id>,
    question: Question,
}

#[derive(Debug, Default)]
struct Content {
    quizzes: Vec<Quiz>,
    categories: Vec<Category>,
    questions: Vec<Entry>,
}

impl Content {
    fn resolve(&self, entry: &Entry) -> Question {
        let mut question = entry.question.clone();
        question.category_name = entry
            .category_id
            .and_then(|id| self.categories.iter().find(|c| c.id == id))
            .map(|c| c.title.clone());
        question
    }
}

/// An in-memory [`Catalog`] with authoring helpers
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    content: RwLock<Content>,
}

impl MemoryCatalog {
    /// Creates an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a quiz owned by `host_id`
    pub fn add_quiz(&self, host_id: Id, title: impl Into<String>) -> Quiz {
        let quiz = Quiz {
            id: Id::new(),
            host_id,
            title: title.into(),
        };
        self.write().quizzes.push(quiz.clone());
        quiz
    }

    /// Adds a category to a quiz
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownQuiz` if the quiz does not exist.
    pub fn add_category(
        &self,
        quiz_id: Id,
        title: impl Into<String>,
        order_num: i32,
    ) -> Result<Id, CatalogError> {
        let mut content = self.write();
        if !content.quizzes.iter().any(|q| q.id == quiz_id) {
            return Err(CatalogError::UnknownQuiz);
        }
        let id = Id::new();
        content.categories.push(Category {
            id,
            quiz_id,
            title: title.into(),
            order_num,
        });
        Ok(id)
    }

    /// Adds a validated question to a quiz, optionally inside a category
    ///
    /// # Errors
    ///
    /// Returns an error if the quiz or category is unknown or the question
    /// fails validation.
    pub fn add_question(
        &self,
        quiz_id: Id,
        category_id: Option<Id>,
        question: Question,
    ) -> Result<Id, CatalogError> {
        question
            .validate()
            .map_err(|report| CatalogError::Invalid(report.to_string()))?;

        let mut content = self.write();
        if !content.quizzes.iter().any(|q| q.id == quiz_id) {
            return Err(CatalogError::UnknownQuiz);
        }
        if let Some(category_id) = category_id
            && !content
                .categories
                .iter()
                .any(|c| c.id == category_id && c.quiz_id == quiz_id)
        {
            return Err(CatalogError::UnknownCategory);
        }
        let id = question.id;
        content.questions.push(Entry {
            quiz_id,
            category_id,
            question,
        });
        Ok(id)
    }

    /// Replaces the content of an existing question, keeping its placement
    ///
    /// # Errors
    ///
    /// Returns an error if the question is unknown or fails validation.
    pub fn replace_question(&self, question: Question) -> Result<(), CatalogError> {
        question
            .validate()
            .map_err(|report| CatalogError::Invalid(report.to_string()))?;

        let mut content = self.write();
        let entry = content
            .questions
            .iter_mut()
            .find(|e| e.question.id == question.id)
            .ok_or(CatalogError::UnknownQuestion)?;
        entry.question = question;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Content> {
        self.content.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Content> {
        self.content.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Catalog for MemoryCatalog {
    fn quiz(&self, quiz_id: Id) -> Result<Option<Quiz>, StoreError> {
        Ok(self.read().quizzes.iter().find(|q| q.id == quiz_id).cloned())
    }

    fn questions(&self, quiz_id: Id) -> Result<Vec<Question>, StoreError> {
        let guard = self.read();
        let content: &Content = &guard;
        let in_quiz = move || {
            content
                .questions
                .iter()
                .filter(move |e| e.quiz_id == quiz_id)
        };

        let categorized = content
            .categories
            .iter()
            .filter(|c| c.quiz_id == quiz_id)
            .sorted_by_key(|c| c.order_num)
            .flat_map(|category| {
                in_quiz()
                    .filter(move |e| e.category_id == Some(category.id))
                    .sorted_by_key(|e| e.question.order_num)
            });
        let uncategorized = in_quiz()
            .filter(|e| e.category_id.is_none())
            .sorted_by_key(|e| e.question.order_num);

        Ok(categorized
            .chain(uncategorized)
            .map(|entry| content.resolve(entry))
            .collect_vec())
    }

    fn question(&self, question_id: Id) -> Result<Option<Question>, StoreError> {
        let content = self.read();
        Ok(content
            .questions
            .iter()
            .find(|e| e.question.id == question_id)
            .map(|entry| content.resolve(entry)))
    }
}
