pub const APP_NAME: &str = "lpkbuild";

/// Manifest file read from the root of every source tree.
pub const MANIFEST_FILENAME: &str = "lzc-manifest.yml";

/// Extension of produced artifacts, without the leading dot.
pub const LPK_EXTENSION: &str = "lpk";

pub const DEFAULT_TEMPLATE_EXTENSION: &str = ".tmpl";

pub const DEFAULT_BUILD_COMMAND: &str = "npx lzc-cli project build .";

/// Default build description file name.
pub const CONFIG_FILENAME: &str = "lpkbuild.toml";

/// Default state file name, stored beside the build description.
pub const STATE_FILENAME: &str = "lpkbuild.state.json";

/// Directory name of the clone inside the ephemeral staging directory.
pub const GIT_CHECKOUT_DIR: &str = "repo";
