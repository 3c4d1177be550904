//! Identification, authentication and authorization for every request.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod ticket;
mod session;
mod post_data;
mod classifier;
mod plugins;
mod form;
mod provider;
mod challenge;
mod authorizer;
mod request_context;
mod middleware;
pub mod clock;

pub use principal::{Principal, UserAccount, is_numeric_userid};
pub use ticket::{Ticket, TicketCodec, TicketError, UserIdChecker};
pub use session::{SessionCookie, SessionCookieOptions, parse_cookie};
pub use post_data::PostFields;
pub use classifier::{Channel, FlashUploadClassifier, default_request_classifier};
pub use plugins::{AuthRequest, Authenticator, Challenger, Claim, Identification, Identifier, Identity, Replacement, query_map};
pub use form::{FormChallenger, LoginForm, redirect, with_query, CAME_FROM, LOGIN_COUNTER, LOGIN_FIELD, PASSWORD_FIELD};
pub use provider::{CredentialAuthenticator, TicketAuthenticator};
pub use challenge::should_challenge;
pub use authorizer::{PermissionPolicy, PermissionResolver, PermissionSet, ANONYMOUS, AUTHENTICATED};
pub use request_context::RequestContext;
pub use middleware::{AuthPipeline, Authenticated, Resolution, add_auth, authenticate, authorize};
pub use clock::{Clock, ManualClock, SystemClock};
