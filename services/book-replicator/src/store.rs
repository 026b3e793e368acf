//! Book store
//!
//! Owns every replicated book, keyed by topic. External callers only read;
//! all writes come from the delta applier or the connection manager's
//! teardown path. A single coarse lock is enough for tens of topics.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use types::ids::Symbol;
use types::topic::Topic;

use crate::order_book::OrderBook;

#[derive(Debug, Clone)]
struct BookEntry {
    book: OrderBook,
    last_message_at: Instant,
}

#[derive(Debug, Default)]
pub struct BookStore {
    books: RwLock<HashMap<Topic, BookEntry>>,
}

impl BookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the book for `topic`.
    pub fn get(&self, topic: &Topic) -> Option<OrderBook> {
        self.books.read().get(topic).map(|entry| entry.book.clone())
    }

    /// Run `f` against the stored book without copying it.
    pub fn with_book<R>(&self, topic: &Topic, f: impl FnOnce(&OrderBook) -> R) -> Option<R> {
        self.books.read().get(topic).map(|entry| f(&entry.book))
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.books.read().contains_key(topic)
    }

    pub(crate) fn put(&self, topic: Topic, book: OrderBook) {
        self.books.write().insert(
            topic,
            BookEntry {
                book,
                last_message_at: Instant::now(),
            },
        );
    }

    /// Read-modify-write the slot for `topic` under the write lock.
    ///
    /// A slot left `Some` is stored and its liveness clock restarted; a slot
    /// left `None` removes the book.
    pub(crate) fn modify<R>(&self, topic: &Topic, f: impl FnOnce(&mut Option<OrderBook>) -> R) -> R {
        let mut books = self.books.write();
        let mut slot = books.remove(topic).map(|entry| entry.book);
        let result = f(&mut slot);
        if let Some(book) = slot {
            books.insert(
                topic.clone(),
                BookEntry {
                    book,
                    last_message_at: Instant::now(),
                },
            );
        }
        result
    }

    pub(crate) fn remove(&self, topic: &Topic) -> bool {
        self.books.write().remove(topic).is_some()
    }

    /// Drop every book whose topic fails `keep`. Returns the removed topics.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&Topic) -> bool) -> Vec<Topic> {
        let mut removed = Vec::new();
        self.books.write().retain(|topic, _| {
            let kept = keep(topic);
            if !kept {
                removed.push(topic.clone());
            }
            kept
        });
        removed
    }

    /// The deepest tracked topic for a symbol.
    pub fn deepest(&self, symbol: &Symbol) -> Option<Topic> {
        self.books
            .read()
            .keys()
            .filter(|topic| &topic.symbol == symbol)
            .max_by_key(|topic| topic.depth)
            .cloned()
    }

    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.books.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.read().is_empty()
    }

    /// Time since the last message touched `topic`'s book.
    pub fn age(&self, topic: &Topic) -> Option<Duration> {
        self.books
            .read()
            .get(topic)
            .map(|entry| entry.last_message_at.elapsed())
    }

    /// A book is stale when absent or untouched for longer than `window`.
    pub fn is_stale(&self, topic: &Topic, window: Duration) -> bool {
        self.age(topic).map_or(true, |age| age > window)
    }

    pub fn stale_topics(&self, window: Duration) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .books
            .read()
            .iter()
            .filter(|(_, entry)| entry.last_message_at.elapsed() > window)
            .map(|(topic, _)| topic.clone())
            .collect();
        topics.sort();
        topics
    }
}
