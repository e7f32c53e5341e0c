use crate::collaborators::{Dialogs, FileDialogOptions};
use futures::future::BoxFuture;
use std::path::PathBuf;
use tokio::task;
use tracing::error;

/// [`Dialogs`] backed by the platform's file pickers.
///
/// The pickers block, so each one runs on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeDialogs;

fn dialog(options: &FileDialogOptions) -> rfd::FileDialog {
    let mut dialog = rfd::FileDialog::new().set_title(options.title.as_str());
    if let Some(name) = &options.default_name {
        dialog = dialog.set_file_name(name.as_str());
    }
    if let Some(directory) = &options.directory {
        dialog = dialog.set_directory(directory);
    }
    for filter in &options.filters {
        dialog = dialog.add_filter(filter.name.as_str(), filter.extensions.as_slice());
    }
    dialog
}

async fn blocking<T: Default + Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    match task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(e) => {
            error!("file dialog failed: {e}");
            T::default()
        }
    }
}

impl Dialogs for NativeDialogs {
    fn save_file(&self, options: FileDialogOptions) -> BoxFuture<'static, Option<PathBuf>> {
        Box::pin(blocking(move || dialog(&options).save_file()))
    }

    fn open_files(&self, options: FileDialogOptions) -> BoxFuture<'static, Vec<PathBuf>> {
        Box::pin(blocking(move || {
            dialog(&options).pick_files().unwrap_or_default()
        }))
    }

    fn open_directory(&self, options: FileDialogOptions) -> BoxFuture<'static, Option<PathBuf>> {
        Box::pin(blocking(move || dialog(&options).pick_folder()))
    }
}
