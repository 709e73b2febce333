//! Sign-in action: verify the code, then open a session

use tracing::info;

use super::verify_otp;
use crate::domains::auth::errors::AuthError;
use crate::domains::auth::models::{is_admin_identifier, Account, Identity};
use crate::domains::auth::TokenPair;
use crate::kernel::ServerDeps;

#[derive(Debug)]
pub struct SignedIn {
    pub account: Account,
    pub tokens: TokenPair,
    pub is_new_user: bool,
}

/// Verify `code` and issue a token pair.
///
/// The account is created on the first successful verification; identities
/// listed in `ADMIN_IDENTIFIERS` get the admin flag at creation.
pub async fn sign_in(identity: &Identity, code: &str, deps: &ServerDeps) -> Result<SignedIn, AuthError> {
    verify_otp(identity, code, deps).await?;

    let is_admin = is_admin_identifier(identity, &deps.admin_identifiers);
    let (account, is_new_user) = deps
        .store
        .find_or_create_account(Account::new(identity, is_admin, deps.now()))
        .await?;

    if is_new_user {
        info!(account_id = %account.id, is_admin, "Account created");
    }
    if !account.is_active {
        return Err(AuthError::AccountDisabled);
    }

    let tokens = deps.tokens.issue(&account).await?;
    Ok(SignedIn {
        account,
        tokens,
        is_new_user,
    })
}
