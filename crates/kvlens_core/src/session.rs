use crate::codec::Format;
use crate::config::ExplorerConfig;
use crate::error::MutationError;
use crate::key_value::{KeyDescriptor, KeyScanRequest, KeyType, RawReply};
use crate::listing::{KeyListing, KeySnapshot};
use crate::mutation::{
    ContentView, CreateRequest, DeleteRequest, MutationService, ReadRequest, UpdateRequest,
};
use crate::traits::StoreRegistry;
use log::debug;

/// Handle for an outstanding read, save or delete.
///
/// Only the completion carrying the latest ticket is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub key: String,
}

/// What the key pane currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyViewState {
    Unselected,
    Loading {
        key: String,
    },
    Displayed(ContentView),
    NotFound {
        key: String,
    },
    /// `previous` keeps the content that was on screen when a save or delete failed.
    Errored {
        key: String,
        message: String,
        previous: Option<ContentView>,
    },
    Saving(ContentView),
    Deleting(ContentView),
}

impl KeyViewState {
    pub fn key(&self) -> Option<&str> {
        match self {
            KeyViewState::Unselected => None,
            KeyViewState::Loading { key }
            | KeyViewState::NotFound { key }
            | KeyViewState::Errored { key, .. } => Some(key),
            KeyViewState::Displayed(view)
            | KeyViewState::Saving(view)
            | KeyViewState::Deleting(view) => Some(&view.key),
        }
    }

    /// Content still on screen, if any.
    pub fn view(&self) -> Option<&ContentView> {
        match self {
            KeyViewState::Displayed(view)
            | KeyViewState::Saving(view)
            | KeyViewState::Deleting(view) => Some(view),
            KeyViewState::Errored { previous, .. } => previous.as_ref(),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            KeyViewState::Loading { .. } | KeyViewState::Saving(_) | KeyViewState::Deleting(_)
        )
    }
}

/// Displayed-key state machine with a generation counter guarding against
/// out-of-order completions.
#[derive(Debug)]
pub struct ExplorerSession {
    generation: u64,
    state: KeyViewState,
}

impl Default for ExplorerSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorerSession {
    pub fn new() -> Self {
        Self {
            generation: 0,
            state: KeyViewState::Unselected,
        }
    }

    pub fn state(&self) -> &KeyViewState {
        &self.state
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.state.key()
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation
    }

    fn issue(&mut self, key: &str) -> Ticket {
        self.generation += 1;
        Ticket {
            generation: self.generation,
            key: key.to_string(),
        }
    }

    /// Starts loading `key`. Any outstanding ticket becomes stale.
    pub fn select(&mut self, key: impl Into<String>) -> Ticket {
        let key = key.into();
        let ticket = self.issue(&key);
        self.state = KeyViewState::Loading { key };
        ticket
    }

    /// Drops the selection, e.g. after switching server or database.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.state = KeyViewState::Unselected;
    }

    /// Applies a finished read. Returns `false` when the ticket is stale and the result was discarded.
    pub fn complete_load(
        &mut self,
        ticket: &Ticket,
        result: Result<ContentView, MutationError>,
    ) -> bool {
        if !self.accept(ticket, "load") {
            return false;
        }

        self.state = match result {
            Ok(view) if view.exists => KeyViewState::Displayed(view),
            Ok(_) => KeyViewState::NotFound {
                key: ticket.key.clone(),
            },
            Err(error) => KeyViewState::Errored {
                key: ticket.key.clone(),
                message: error.to_string(),
                previous: None,
            },
        };
        true
    }

    /// Starts saving the displayed key. `None` unless a key is displayed.
    pub fn begin_save(&mut self) -> Option<Ticket> {
        let view = self.take_editable()?;
        let ticket = self.issue(&view.key);
        self.state = KeyViewState::Saving(view);
        Some(ticket)
    }

    /// Applies a finished save: the refreshed view on success, the previous
    /// content with the error otherwise.
    pub fn complete_save(
        &mut self,
        ticket: &Ticket,
        result: Result<ContentView, MutationError>,
    ) -> bool {
        if !self.accept(ticket, "save") {
            return false;
        }

        let previous = self.state.view().cloned();
        self.state = match result {
            Ok(view) if view.exists => KeyViewState::Displayed(view),
            Ok(_) => KeyViewState::NotFound {
                key: ticket.key.clone(),
            },
            Err(error) => KeyViewState::Errored {
                key: ticket.key.clone(),
                message: error.to_string(),
                previous,
            },
        };
        true
    }

    /// Starts deleting the displayed key. `None` unless a key is displayed.
    pub fn begin_delete(&mut self) -> Option<Ticket> {
        let view = self.take_editable()?;
        let ticket = self.issue(&view.key);
        self.state = KeyViewState::Deleting(view);
        Some(ticket)
    }

    pub fn complete_delete(&mut self, ticket: &Ticket, result: Result<bool, MutationError>) -> bool {
        if !self.accept(ticket, "delete") {
            return false;
        }

        let previous = self.state.view().cloned();
        self.state = match result {
            Ok(_) => KeyViewState::Unselected,
            Err(error) => KeyViewState::Errored {
                key: ticket.key.clone(),
                message: error.to_string(),
                previous,
            },
        };
        true
    }

    /// Content a save or delete may start from: a displayed key, or the
    /// content kept after a failed save.
    fn take_editable(&self) -> Option<ContentView> {
        match &self.state {
            KeyViewState::Displayed(view) => Some(view.clone()),
            KeyViewState::Errored {
                previous: Some(view),
                ..
            } => Some(view.clone()),
            _ => None,
        }
    }

    fn accept(&self, ticket: &Ticket, action: &str) -> bool {
        if self.is_current(ticket) {
            return true;
        }

        debug!(
            "Discarding stale {} of '{}' (generation {}, current {})",
            action, ticket.key, ticket.generation, self.generation
        );
        false
    }
}

/// One operator's view of one server: key list, displayed key and the
/// service that performs mutations.
///
/// Mutations run synchronously; after a create or update the key is read
/// back so the display always reflects the store.
pub struct Explorer {
    service: MutationService,
    listing: KeyListing,
    session: ExplorerSession,
    server: String,
    database: Option<u32>,
    max_keys: usize,
    scan_count: u32,
}

impl Explorer {
    pub fn new(service: MutationService, server: impl Into<String>) -> Self {
        Self {
            service,
            listing: KeyListing::new(),
            session: ExplorerSession::new(),
            server: server.into(),
            database: None,
            max_keys: KeyScanRequest::DEFAULT_MAX_KEYS,
            scan_count: KeyScanRequest::DEFAULT_COUNT,
        }
    }

    /// Builds an explorer on `server` with the limits and policies from `config`.
    pub fn from_config(
        config: &ExplorerConfig,
        registry: StoreRegistry,
        server: &str,
    ) -> Result<Self, MutationError> {
        if !registry.contains(server) {
            return Err(MutationError::UnknownServer(server.to_string()));
        }

        let service = MutationService::new(registry)
            .with_negative_ttl_policy(config.negative_ttl_policy)
            .with_default_format(config.default_format);

        let database = config.server(server).map(|s| s.db);

        let mut explorer = Self::new(service, server);
        explorer.database = database;
        explorer.max_keys = config.max_keys;
        explorer.scan_count = config.scan_count;
        Ok(explorer)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn database(&self) -> Option<u32> {
        self.database
    }

    pub fn service(&self) -> &MutationService {
        &self.service
    }

    pub fn session(&self) -> &ExplorerSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ExplorerSession {
        &mut self.session
    }

    pub fn listing(&self) -> &KeyListing {
        &self.listing
    }

    /// Switches server and database. The key list and the displayed key are dropped.
    pub fn switch_to(
        &mut self,
        server: impl Into<String>,
        database: Option<u32>,
    ) -> Result<(), MutationError> {
        let server = server.into();
        if !self.service.registry().contains(&server) {
            return Err(MutationError::UnknownServer(server));
        }

        self.server = server;
        self.database = database;
        self.listing.clear();
        self.session.clear();
        Ok(())
    }

    /// Scans keys matching `pattern` (empty matches everything).
    pub fn refresh_keys(&mut self, pattern: &str) -> Result<&KeySnapshot, MutationError> {
        let store = self.service.store(&self.server)?;

        let mut request = KeyScanRequest::new(pattern)
            .with_max_keys(self.max_keys)
            .with_count(self.scan_count);
        if let Some(database) = self.database {
            request = request.with_database(database);
        }

        Ok(self.listing.refresh(store.as_ref(), &request)?)
    }

    /// Client-side filter over the current key list; never touches the store.
    pub fn filter(&self, substring: &str) -> Vec<KeyDescriptor> {
        self.listing.filter(substring)
    }

    /// Loads `key` into the display.
    pub fn open(&mut self, key: &str, format: Option<Format>) -> &KeyViewState {
        let ticket = self.session.select(key);
        let result = self.read(key, format);
        self.session.complete_load(&ticket, result);
        self.session.state()
    }

    pub fn create(
        &mut self,
        key_type: KeyType,
        key: &str,
        ttl: &str,
        format: Format,
        value: &str,
    ) -> Result<&KeyViewState, MutationError> {
        let request = CreateRequest::new(&self.server, key, key_type, value)
            .with_database(self.database)
            .with_ttl(ttl)
            .with_format(format);

        if let Err(error) = self.service.create(&request) {
            // The value exists even though its TTL is missing.
            if error.is_partial() {
                self.open(key, Some(format));
                self.sync_listing(key, true);
            }
            return Err(error);
        }

        self.open(key, Some(format));
        self.sync_listing(key, true);
        Ok(self.session.state())
    }

    /// Saves edited content for the displayed key and shows it as stored.
    pub fn save(&mut self, content: &str, format: Format) -> Result<&KeyViewState, MutationError> {
        let ticket = self.session.begin_save().ok_or(MutationError::NoSelection)?;

        let request = UpdateRequest::new(&self.server, &ticket.key, content, format)
            .with_database(self.database);

        match self.service.update(&request) {
            Ok(_) => {
                let refreshed = self.read(&ticket.key, Some(format));
                self.session.complete_save(&ticket, refreshed);
                self.sync_listing(&ticket.key, false);
                Ok(self.session.state())
            }
            Err(error) => {
                if let MutationError::NotFound(_) = error {
                    self.listing.remove(&ticket.key);
                }
                self.session.complete_save(&ticket, Err(error.clone()));
                Err(error)
            }
        }
    }

    /// Deletes the displayed key. Returns whether the store removed anything.
    pub fn delete(&mut self) -> Result<bool, MutationError> {
        let ticket = self
            .session
            .begin_delete()
            .ok_or(MutationError::NoSelection)?;

        let request = DeleteRequest::new(&self.server, &ticket.key).with_database(self.database);
        let result = self.service.delete(&request);

        if result.is_ok() {
            self.listing.remove(&ticket.key);
        }
        self.session.complete_delete(&ticket, result.clone());
        result
    }

    pub fn run_command(&self, command: &str) -> Result<RawReply, MutationError> {
        self.service
            .run_raw_command(&self.server, self.database, command)
    }

    /// Mirrors the displayed state of `key` into the listing. A key that is
    /// gone after a write is dropped; one that exists is updated in place,
    /// and added only when `insert` is set.
    fn sync_listing(&mut self, key: &str, insert: bool) {
        let descriptor = match self.session.state() {
            KeyViewState::Displayed(view) if view.key == key => Some(descriptor_of(view)),
            KeyViewState::NotFound { key: missing } if missing == key => None,
            _ => return,
        };

        match descriptor {
            Some(descriptor) if insert || self.listing.snapshot().get(key).is_some() => {
                self.listing.append(descriptor)
            }
            Some(_) => {}
            None => {
                self.listing.remove(key);
            }
        }
    }

    fn read(&self, key: &str, format: Option<Format>) -> Result<ContentView, MutationError> {
        let request = ReadRequest::new(&self.server, key)
            .with_database(self.database)
            .with_format(format);
        self.service.read(&request)
    }
}

fn descriptor_of(view: &ContentView) -> KeyDescriptor {
    let key_type = view.key_type.unwrap_or(KeyType::String);
    let descriptor = KeyDescriptor::new(view.key.clone(), key_type);
    if key_type.is_composite() {
        descriptor.with_len(view.size)
    } else {
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn view(key: &str, content: &str) -> ContentView {
        ContentView {
            key: key.to_string(),
            key_type: Some(KeyType::String),
            content: content.to_string(),
            ttl: "no expiry".to_string(),
            size: content.len() as u64,
            encoding: "embstr".to_string(),
            format: Some(Format::String),
            exists: true,
            error: String::new(),
        }
    }

    #[test]
    fn stale_load_is_discarded() {
        let mut session = ExplorerSession::new();
        let first = session.select("a");
        let second = session.select("b");

        assert!(session.complete_load(&second, Ok(view("b", "B"))));
        assert!(!session.complete_load(&first, Ok(view("a", "A"))));

        assert_eq!(session.state(), &KeyViewState::Displayed(view("b", "B")));
    }

    #[test]
    fn older_response_arriving_first_does_not_win() {
        let mut session = ExplorerSession::new();
        let first = session.select("a");
        let second = session.select("b");

        assert!(!session.complete_load(&first, Ok(view("a", "A"))));
        assert_eq!(session.state(), &KeyViewState::Loading { key: "b".to_string() });

        assert!(session.complete_load(&second, Ok(view("b", "B"))));
        assert_eq!(session.selected_key(), Some("b"));
    }

    #[test]
    fn missing_key_moves_to_not_found() {
        let mut session = ExplorerSession::new();
        let ticket = session.select("gone");
        session.complete_load(&ticket, Ok(ContentView::missing("gone")));

        assert_eq!(
            session.state(),
            &KeyViewState::NotFound { key: "gone".to_string() }
        );
        assert!(session.begin_save().is_none());
    }

    #[test]
    fn failed_save_keeps_previous_content() {
        let mut session = ExplorerSession::new();
        let ticket = session.select("k");
        session.complete_load(&ticket, Ok(view("k", "old")));

        let save = session.begin_save().unwrap();
        assert!(session.state().is_busy());
        session.complete_save(
            &save,
            Err(MutationError::Store(StoreError::unavailable("down"))),
        );

        match session.state() {
            KeyViewState::Errored { previous, message, .. } => {
                assert_eq!(previous.as_ref(), Some(&view("k", "old")));
                assert!(message.contains("down"));
            }
            other => panic!("unexpected state {other:?}"),
        }

        // Retrying from the kept content is allowed.
        assert!(session.begin_save().is_some());
    }

    #[test]
    fn save_superseded_by_new_selection_is_discarded() {
        let mut session = ExplorerSession::new();
        let ticket = session.select("k");
        session.complete_load(&ticket, Ok(view("k", "old")));

        let save = session.begin_save().unwrap();
        let other = session.select("other");

        assert!(!session.complete_save(&save, Ok(view("k", "new"))));
        assert!(session.complete_load(&other, Ok(view("other", "x"))));
        assert_eq!(session.selected_key(), Some("other"));
    }

    #[test]
    fn delete_returns_to_unselected() {
        let mut session = ExplorerSession::new();
        let ticket = session.select("k");
        session.complete_load(&ticket, Ok(view("k", "v")));

        let delete = session.begin_delete().unwrap();
        assert!(matches!(session.state(), KeyViewState::Deleting(_)));
        assert!(session.complete_delete(&delete, Ok(true)));
        assert_eq!(session.state(), &KeyViewState::Unselected);
    }

    #[test]
    fn nothing_to_save_or_delete_when_unselected() {
        let mut session = ExplorerSession::new();
        assert!(session.begin_save().is_none());
        assert!(session.begin_delete().is_none());
    }

    #[test]
    fn clear_invalidates_outstanding_tickets() {
        let mut session = ExplorerSession::new();
        let ticket = session.select("k");
        session.clear();

        assert!(!session.complete_load(&ticket, Ok(view("k", "v"))));
        assert_eq!(session.state(), &KeyViewState::Unselected);
    }
}
