//! Shared template environment

use crate::transform::filters;
use minijinja::Environment;
use std::path::Path;

/// Template environment with the record filters installed
///
/// With a folder, `.jinja` templates are resolved from it by file name and
/// may include one another.
pub fn template_environment(folder: Option<&Path>) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);

    env.add_filter("datetime_format", filters::datetime_format);
    env.add_filter("list_of_str", filters::list_of_str);
    env.add_filter("convert_categories", filters::convert_categories);
    env.add_filter("remove_symbol", filters::remove_symbol);
    env.add_filter("split", filters::split);
    env.add_filter("fix_url", filters::fix_url);
    env.add_filter("jsonify", filters::jsonify);

    if let Some(folder) = folder {
        env.set_loader(minijinja::path_loader(folder.to_path_buf()));
    }

    env
}

/// Environment shared by every transformer for the rest of the process
///
/// Compiled expressions borrow their environment, so the environment is
/// given a `'static` lifetime. Call once per template folder.
pub fn shared_environment(folder: Option<&Path>) -> &'static Environment<'static> {
    Box::leak(Box::new(template_environment(folder)))
}
