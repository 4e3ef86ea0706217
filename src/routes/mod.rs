/// Router Module Index
///
/// Routes are split by access level. Paths shared between the two routers
/// (e.g. GET and POST on `/courses`) are merged per method, so the
/// authentication layer only wraps the authenticated methods.

/// Routes open to anonymous callers. Handlers still receive the caller's actor
/// when credentials are present and apply the visibility policy to it.
pub mod public;

/// Routes behind the `AuthUser` middleware.
pub mod authenticated;
