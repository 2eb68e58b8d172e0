//! Outgoing mail — letter helpers, message assembly, and delivery.

pub mod assembler;
pub mod delivery;
pub mod gmail;
pub mod letter;

pub use assembler::{DiplomaMessage, InlineLogo, build_diploma_message, build_text_message};
pub use delivery::DeliveryClient;
pub use gmail::GmailClient;
pub use letter::{LOGO_CID, inject_logo_cid, personalize_body, text_to_html};
