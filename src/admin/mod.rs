//! Admin-site configuration: what each registered model shows in its
//! changelist and forms. Nothing in here touches the database.

pub mod labels;
pub mod layout;
pub mod options;
pub mod site;
