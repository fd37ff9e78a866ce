pub mod bundle;
pub mod error;
pub mod value;
pub mod web_ui;

pub use bundle::{BUNDLE_FORMAT_VERSION, BundleSection, BundleWarning, ExportOptions, ImportBundle, ParsedBundle};
pub use error::CoreError;
pub use value::{PrefMap, PrefValue};
pub use web_ui::WebUiSettings;
