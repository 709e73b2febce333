pub mod account;
pub mod challenge;
pub mod identifier;
pub mod refresh_token;

pub use account::Account;
pub use challenge::{generate_code, is_well_formed_code, LockState, OtpChallenge, OTP_CODE_LENGTH};
pub use identifier::{hash_secret, is_admin_identifier, Identity, IdentityKind};
pub use refresh_token::{
    generate_refresh_token, hash_refresh_token, NewRefreshToken, RefreshTokenRecord,
    RefreshTokenStatus,
};
