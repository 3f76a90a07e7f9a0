//! Seed data builders.

use crate::memory_store::InMemoryLibraryStore;
use chrono::{DateTime, Utc};
use libris_core::store::LibraryStore;
use libris_core::types::{
    Author, Book, BookId, Profile, ProfileId, Role, Session, SessionToken, Subject, UserAccount,
    UserId,
};
use std::sync::Arc;

/// An identity with its linked profile.
#[derive(Clone, Debug)]
pub struct SeededStudent {
    /// Identity record
    pub user: UserAccount,
    /// Linked profile
    pub profile: Profile,
}

/// Builds a populated [`InMemoryLibraryStore`].
#[derive(Clone, Debug, Default)]
pub struct LibraryFixture {
    store: InMemoryLibraryStore,
}

impl LibraryFixture {
    /// Empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The store being populated.
    #[must_use]
    pub const fn store(&self) -> &InMemoryLibraryStore {
        &self.store
    }

    /// The store as a trait object, ready for `BorrowLifecycle::new`.
    #[must_use]
    pub fn store_arc(&self) -> Arc<dyn LibraryStore> {
        Arc::new(self.store.clone())
    }

    /// Add a book with `copies` copies, all on the shelf.
    pub fn book(&self, title: &str, copies: i32) -> Book {
        let book = Book {
            id: BookId::new(),
            catalog_no: None,
            title: title.to_string(),
            subtitle: None,
            language_code: Some("en".to_string()),
            author_ids: Vec::new(),
            place_of_publication: None,
            publisher_id: None,
            year_of_publication: None,
            subject_id: None,
            stream: None,
            image_url: None,
            total_copies: copies,
            available_copies: copies,
        };
        self.store.insert_book(book.clone());
        book
    }

    /// Add a book with authors, subject and stream set.
    pub fn catalogued_book(
        &self,
        title: &str,
        author_ids: &[i32],
        subject_id: Option<i32>,
        stream: Option<&str>,
    ) -> Book {
        let mut book = self.book(title, 1);
        book.author_ids = author_ids.to_vec();
        book.subject_id = subject_id;
        book.stream = stream.map(str::to_string);
        self.store.insert_book(book.clone());
        book
    }

    /// Add an author.
    pub fn author(&self, id: i32, name: &str) -> Author {
        let author = Author {
            id,
            name: name.to_string(),
        };
        self.store.insert_author(author.clone());
        author
    }

    /// Add a subject.
    pub fn subject(&self, id: i32, name: &str) -> Subject {
        let subject = Subject {
            id,
            name: name.to_string(),
        };
        self.store.insert_subject(subject.clone());
        subject
    }

    /// Add a student identity with a linked profile.
    pub fn student(&self, user_code: &str, email: &str) -> SeededStudent {
        self.member(user_code, email, Role::Student)
    }

    /// Add a librarian identity with a linked profile.
    pub fn admin(&self, user_code: &str, email: &str) -> SeededStudent {
        self.member(user_code, email, Role::Admin)
    }

    /// Add an identity that never created a profile.
    pub fn user_without_profile(&self, user_code: &str) -> UserAccount {
        let user = UserAccount {
            id: UserId::new(),
            user_code: user_code.to_string(),
            role: Role::Student,
            profile_id: None,
            penalties: Vec::new(),
        };
        self.store.insert_user(user.clone());
        user
    }

    /// Issue a session for `user_id` valid until `expires_at`.
    pub fn session(&self, user_id: UserId, expires_at: DateTime<Utc>) -> Session {
        let session = Session {
            token: SessionToken::new(),
            user_id,
            expires_at,
        };
        self.store.insert_session(session.clone());
        session
    }

    fn member(&self, user_code: &str, email: &str, role: Role) -> SeededStudent {
        let profile = Profile {
            id: ProfileId::new(),
            student_id: user_code.to_string(),
            first_name: "Test".to_string(),
            last_name: user_code.to_string(),
            email: email.to_string(),
            phone_number: None,
            department: Some("Computer Science".to_string()),
            year_level: Some("2".to_string()),
        };
        let user = UserAccount {
            id: UserId::new(),
            user_code: user_code.to_string(),
            role,
            profile_id: Some(profile.id),
            penalties: Vec::new(),
        };
        self.store.insert_profile(profile.clone());
        self.store.insert_user(user.clone());
        SeededStudent { user, profile }
    }
}
