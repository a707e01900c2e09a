// The session client: login state machine plus the five remote operations.
// Everything is one request/response exchange; failures surface immediately
// and nothing is retried.

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::decode::{self, Booking, DecodeError};
use crate::directory::{DirectoryError, RoomDirectory};
use crate::transport::{ClientConfig, HttpTransport, ServerCall, Transport, TransportError};
use crate::window::{self, AvailabilityWindow};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("not authenticated: call login() first")]
    NotAuthenticated,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Lookup(#[from] DirectoryError),

    #[error("no bookings cached: list_bookings() has not returned any")]
    NoBookingsCached,
}

/// A venue-calendar entry for display: the room is occupied over this range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailabilityRecord {
    pub booking_id: String,
    pub room_id: String,
    pub start: String,
    pub end: String,
}

/// One authenticated conversation with the site. Holds the most recent booking
/// snapshot only; not meant to be shared across threads.
pub struct Session<T> {
    transport: T,
    directory: RoomDirectory,
    authenticated: bool,
    cached_bookings: Option<Vec<Booking>>,
    last_window: Option<AvailabilityWindow>,
}

impl Session<HttpTransport> {
    pub fn connect(config: &ClientConfig, directory: RoomDirectory) -> Result<Self, SessionError> {
        Ok(Self::with_transport(HttpTransport::new(config)?, directory))
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(transport: T, directory: RoomDirectory) -> Self {
        Self {
            transport,
            directory,
            authenticated: false,
            cached_bookings: None,
            last_window: None,
        }
    }

    /// Posts credentials and moves to the authenticated state.
    ///
    /// The site answers 200 for rejected credentials too and the body is not
    /// inspected, so a bad password only surfaces when the next call comes
    /// back empty or rejected. Long-standing site behaviour, kept as is.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), SessionError> {
        debug!(user, "posting credentials");
        self.transport
            .post_form(
                ServerCall::Login,
                &[
                    ("authenticate-useraccount", user),
                    ("authenticate-password", password),
                ],
            )
            .await?;
        warn!("login response body is not verified; assuming authenticated");
        self.authenticated = true;
        Ok(())
    }

    /// Lists the caller's reservations inside a fresh 26 h window and caches
    /// the snapshot for `latest_booking_id`.
    pub async fn list_bookings(&mut self) -> Result<Vec<Booking>, SessionError> {
        self.ensure_authenticated()?;
        let window = AvailabilityWindow::starting(Local::now());
        let html = self
            .transport
            .get(
                ServerCall::Index,
                &[("dato", window.start.date.as_str()), ("akt", "visegne")],
            )
            .await?;
        let bookings = decode::booking_list(&html)?;
        info!(count = bookings.len(), "listing decoded");
        self.last_window = Some(window);
        self.cached_bookings = Some(bookings.clone());
        Ok(bookings)
    }

    /// The window computed by the most recent `list_bookings` call.
    pub fn last_window(&self) -> Option<&AvailabilityWindow> {
        self.last_window.as_ref()
    }

    /// Books a room by its human code. Date and clock strings go to the site
    /// unvalidated; malformed input is the remote system's to reject.
    pub async fn create_booking(
        &self,
        room_name: &str,
        date: &str,
        start_time: &str,
        end_time: &str,
        description: &str,
    ) -> Result<Value, SessionError> {
        self.ensure_authenticated()?;
        let room_id = self.directory.resolve_room_id(room_name)?.to_string();
        debug!(room_name, room_id, date, start_time, end_time, "saving event");
        let payload = self
            .transport
            .post_form(
                ServerCall::EventSave,
                &[
                    ("event-id", "0"),
                    ("location-id", &room_id),
                    ("date", date),
                    ("starttime", start_time),
                    ("endtime", end_time),
                    ("location", room_name),
                    ("description", description),
                ],
            )
            .await?;
        Ok(decode::first_record(&payload)?)
    }

    pub async fn cancel_booking(&self, booking_id: &str) -> Result<Value, SessionError> {
        self.ensure_authenticated()?;
        let payload = self
            .transport
            .get(ServerCall::EventCancel, &[("id", booking_id)])
            .await?;
        info!(booking_id, "cancellation requested");
        Ok(decode::first_record(&payload)?)
    }

    /// The maximal booking id in the cached snapshot. Ids compare as strings,
    /// exactly as the site hands them out: "9" beats "100".
    pub fn latest_booking_id(&self) -> Result<&str, SessionError> {
        self.cached_bookings
            .as_deref()
            .ok_or(SessionError::NoBookingsCached)?
            .iter()
            .map(|booking| booking.id.as_str())
            .max()
            .ok_or(SessionError::NoBookingsCached)
    }

    /// Occupied ranges for a whole room group on one day. Takes the date as
    /// `D/M/YYYY` and reverses it into the feed's `YYYY-M-D` form.
    pub async fn fetch_unavailability(
        &self,
        date: &str,
        room_group_id: &str,
    ) -> Result<Vec<UnavailabilityRecord>, SessionError> {
        self.ensure_authenticated()?;
        let feed_date = reverse_date(date);
        let group = format!("-{room_group_id}");
        debug!(feed_date, group, "fetching event feed");
        let payload = self
            .transport
            .get(
                ServerCall::FetchEvents,
                &[
                    ("starttime", feed_date.as_str()),
                    ("endtime", feed_date.as_str()),
                    ("locationgroup", group.as_str()),
                ],
            )
            .await?;
        let rows = decode::event_rows(&payload)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let (start, end) =
                    window::offset_to_clock_range(row.offset, row.duration_minutes);
                UnavailabilityRecord {
                    booking_id: row.booking_id,
                    room_id: row.room_id,
                    start,
                    end,
                }
            })
            .collect())
    }

    /// Legacy per-event lookup, superseded by the offset transform in
    /// `fetch_unavailability` but kept as a reference for the old format.
    pub async fn event_info(&self, booking_id: &str) -> Result<(String, String), SessionError> {
        self.ensure_authenticated()?;
        let html = self
            .transport
            .get(ServerCall::EventInfo, &[("id", booking_id)])
            .await?;
        Ok(decode::event_info_times(&html)?)
    }

    fn ensure_authenticated(&self) -> Result<(), SessionError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(SessionError::NotAuthenticated)
        }
    }
}

// "D/M/YYYY" -> "YYYY-M-D" by segment reversal; no zero padding, the feed
// takes the segments as typed.
fn reverse_date(date: &str) -> String {
    let mut parts: Vec<&str> = date.split('/').collect();
    parts.reverse();
    parts.join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use async_trait::async_trait;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Recorded {
        call: ServerCall,
        method: &'static str,
        params: Vec<(String, String)>,
    }

    /// Canned-response transport; records every request it is handed.
    struct MockTransport {
        responses: HashMap<ServerCall, String>,
        requests: Mutex<Vec<Recorded>>,
    }

    impl MockTransport {
        fn new(responses: &[(ServerCall, &str)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(call, body)| (*call, body.to_string()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: ServerCall, method: &'static str, params: &[(&str, &str)]) {
            self.requests.lock().unwrap().push(Recorded {
                call,
                method,
                params: params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
        }

        fn respond(&self, call: ServerCall) -> Result<String, TransportError> {
            match self.responses.get(&call) {
                Some(body) => Ok(body.clone()),
                None => panic!("no canned response for {call:?}"),
            }
        }

        fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for &MockTransport {
        async fn get(
            &self,
            call: ServerCall,
            query: &[(&str, &str)],
        ) -> Result<String, TransportError> {
            self.record(call, "GET", query);
            self.respond(call)
        }

        async fn post_form(
            &self,
            call: ServerCall,
            form: &[(&str, &str)],
        ) -> Result<String, TransportError> {
            self.record(call, "POST", form);
            self.respond(call)
        }
    }

    fn session(transport: &MockTransport) -> Session<&MockTransport> {
        Session::with_transport(transport, RoomDirectory::esmuc().unwrap())
    }

    fn param<'a>(request: &'a Recorded, key: &str) -> &'a str {
        request
            .params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| panic!("missing param {key} in {request:?}"))
    }

    const LISTING: &str = r##"
<table>
  <tr><td>21:00 - 21:30</td></tr>
  <tr><td><div><a class="event-link" rel="254871" href="#">reserva</a><span>A340</span></div></td></tr>
</table>
"##;

    #[tokio::test]
    async fn login_posts_the_credential_form() {
        let transport = MockTransport::new(&[(ServerCall::Login, "<html>welcome</html>")]);
        let mut session = session(&transport);
        session.login("student", "secret").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].call, ServerCall::Login);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(param(&requests[0], "authenticate-useraccount"), "student");
        assert_eq!(param(&requests[0], "authenticate-password"), "secret");
    }

    #[tokio::test]
    async fn operations_before_login_fail_without_sending_anything() {
        let transport = MockTransport::new(&[]);
        let mut session = session(&transport);

        assert!(matches!(
            session.list_bookings().await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(matches!(
            session
                .create_booking("A340", "1/10/2013", "21:00", "21:30", "desc")
                .await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(matches!(
            session.cancel_booking("1").await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(matches!(
            session.fetch_unavailability("1/10/2013", "5").await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(matches!(
            session.event_info("1").await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn list_bookings_anchors_on_a_fresh_window_and_caches() {
        let transport = MockTransport::new(&[
            (ServerCall::Login, ""),
            (ServerCall::Index, LISTING),
        ]);
        let mut session = session(&transport);
        session.login("student", "secret").await.unwrap();

        let bookings = session.list_bookings().await.unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].id, "254871");
        assert_eq!(bookings[0].room, "A340");
        assert_eq!(bookings[0].time_label, "21:00 - 21:30");

        let listing = &transport.requests()[1];
        assert_eq!(listing.call, ServerCall::Index);
        assert_eq!(param(listing, "akt"), "visegne");
        let dato = param(listing, "dato");
        assert_eq!(dato.len(), 8);
        assert!(dato.chars().all(|c| c.is_ascii_digit()));

        let window = session.last_window().unwrap();
        assert_eq!(window.end.secs - window.start.secs, 93_600);
        assert_eq!(window.start.date, dato);

        assert_eq!(session.latest_booking_id().unwrap(), "254871");
    }

    #[tokio::test]
    async fn latest_booking_id_sorts_ids_as_strings() {
        let transport = MockTransport::new(&[]);
        let mut session = session(&transport);
        session.cached_bookings = Some(
            ["12", "9", "100"]
                .map(|id| Booking {
                    id: id.into(),
                    room: "A340".into(),
                    time_label: String::new(),
                })
                .to_vec(),
        );
        assert_eq!(session.latest_booking_id().unwrap(), "9");
    }

    #[tokio::test]
    async fn latest_booking_id_requires_a_cached_snapshot() {
        let transport = MockTransport::new(&[]);
        let mut session = session(&transport);
        assert!(matches!(
            session.latest_booking_id(),
            Err(SessionError::NoBookingsCached)
        ));

        session.cached_bookings = Some(Vec::new());
        assert!(matches!(
            session.latest_booking_id(),
            Err(SessionError::NoBookingsCached)
        ));
    }

    #[tokio::test]
    async fn create_booking_resolves_the_room_and_posts_the_fixed_form() {
        let transport = MockTransport::new(&[
            (ServerCall::Login, ""),
            (ServerCall::EventSave, r#"[{"id": 254871, "status": "ok"}]"#),
        ]);
        let mut session = session(&transport);
        session.login("student", "secret").await.unwrap();

        let record = session
            .create_booking("A340", "1/10/2013", "21:00", "21:30", "quartet rehearsal")
            .await
            .unwrap();
        assert_eq!(record["id"], 254871);

        let save = &transport.requests()[1];
        assert_eq!(save.call, ServerCall::EventSave);
        assert_eq!(save.method, "POST");
        assert_eq!(param(save, "event-id"), "0");
        assert_eq!(param(save, "location-id"), "74");
        assert_eq!(param(save, "date"), "1/10/2013");
        assert_eq!(param(save, "starttime"), "21:00");
        assert_eq!(param(save, "endtime"), "21:30");
        assert_eq!(param(save, "location"), "A340");
        assert_eq!(param(save, "description"), "quartet rehearsal");
    }

    #[tokio::test]
    async fn create_booking_with_unknown_room_never_reaches_the_site() {
        let transport = MockTransport::new(&[(ServerCall::Login, "")]);
        let mut session = session(&transport);
        session.login("student", "secret").await.unwrap();

        assert!(matches!(
            session
                .create_booking("Z999", "1/10/2013", "21:00", "21:30", "")
                .await,
            Err(SessionError::Lookup(DirectoryError::UnknownRoom(_)))
        ));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn cancel_booking_returns_the_first_record() {
        let transport = MockTransport::new(&[
            (ServerCall::Login, ""),
            (ServerCall::EventCancel, r#"[{"cancelled": true}]"#),
        ]);
        let mut session = session(&transport);
        session.login("student", "secret").await.unwrap();

        let record = session.cancel_booking("254871").await.unwrap();
        assert_eq!(record["cancelled"], true);
        assert_eq!(param(&transport.requests()[1], "id"), "254871");
    }

    #[tokio::test]
    async fn fetch_unavailability_reverses_the_date_and_signs_the_group() {
        let transport = MockTransport::new(&[
            (ServerCall::Login, ""),
            (
                ServerCall::FetchEvents,
                r#"[[254871, 23016360, 30, "74"]]"#,
            ),
        ]);
        let mut session = session(&transport);
        session.login("student", "secret").await.unwrap();

        let records = session.fetch_unavailability("1/10/2013", "5").await.unwrap();
        assert_eq!(
            records,
            vec![UnavailabilityRecord {
                booking_id: "254871".into(),
                room_id: "74".into(),
                start: "16:00".into(),
                end: "16:30".into(),
            }]
        );

        let fetch = &transport.requests()[1];
        assert_eq!(fetch.call, ServerCall::FetchEvents);
        assert_eq!(param(fetch, "starttime"), "2013-10-1");
        assert_eq!(param(fetch, "endtime"), "2013-10-1");
        assert_eq!(param(fetch, "locationgroup"), "-5");
    }

    #[tokio::test]
    async fn event_info_reads_the_legacy_fragment() {
        let transport = MockTransport::new(&[
            (ServerCall::Login, ""),
            (
                ServerCall::EventInfo,
                "<div><span>21:00 fins a les 21:30</span></div>",
            ),
        ]);
        let mut session = session(&transport);
        session.login("student", "secret").await.unwrap();

        let (start, end) = session.event_info("254871").await.unwrap();
        assert_eq!(start, "21:00");
        assert_eq!(end, "21:30");
    }

    #[tokio::test]
    async fn booked_range_shows_up_in_the_next_listing() {
        let transport = MockTransport::new(&[
            (ServerCall::Login, ""),
            (ServerCall::EventSave, r#"[{"id": 254871}]"#),
            (ServerCall::Index, LISTING),
        ]);
        let mut session = session(&transport);
        session.login("student", "secret").await.unwrap();
        session
            .create_booking("A340", "1/10/2013", "21:00", "21:30", "desc")
            .await
            .unwrap();

        let bookings = session.list_bookings().await.unwrap();
        assert!(bookings
            .iter()
            .any(|booking| booking.time_label == "21:00 - 21:30"));
    }

    #[test]
    fn date_segments_reverse_without_padding() {
        assert_eq!(reverse_date("1/10/2013"), "2013-10-1");
        assert_eq!(reverse_date("21/3/2014"), "2014-3-21");
    }
}
