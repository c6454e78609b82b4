use std::borrow::Cow;

use validator::{Validate, ValidationError, ValidationErrors};

use crate::model::{FavouritesPackage, HistoryPackage, Manga};

fn invalid(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(Cow::from(message))
}

fn check_embedded_manga(
    errors: &mut ValidationErrors,
    field: &'static str,
    index: usize,
    manga_id: i64,
    manga: Option<&Manga>,
) {
    if let Some(manga) = manga {
        if manga.manga_id != manga_id {
            errors.add(
                field,
                invalid(
                    "manga_id_mismatch",
                    format!(
                        "{}[{}] references manga {} but embeds manga {}",
                        field, index, manga_id, manga.manga_id
                    ),
                ),
            );
        }
    }
}

fn check_timestamps(
    errors: &mut ValidationErrors,
    field: &'static str,
    index: usize,
    timestamps: &[i64],
) {
    if timestamps.iter().any(|timestamp| *timestamp < 0) {
        errors.add(
            field,
            invalid(
                "timestamp_negative",
                format!("{}[{}] has a negative timestamp", field, index),
            ),
        );
    }
}

impl Validate for HistoryPackage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for (index, history) in self.history.iter().enumerate() {
            check_embedded_manga(
                &mut errors,
                "history",
                index,
                history.manga_id,
                history.manga.as_ref(),
            );
            check_timestamps(
                &mut errors,
                "history",
                index,
                &[history.created_at, history.updated_at, history.deleted_at],
            );
        }

        if !errors.errors().is_empty() {
            return Err(errors);
        }

        Ok(())
    }
}

impl Validate for FavouritesPackage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for (index, category) in self.categories.iter().enumerate() {
            check_timestamps(
                &mut errors,
                "favourite_categories",
                index,
                &[category.created_at, category.deleted_at.unwrap_or(0)],
            );
        }

        for (index, favourite) in self.favourites.iter().enumerate() {
            check_embedded_manga(
                &mut errors,
                "favourites",
                index,
                favourite.manga_id,
                favourite.manga.as_ref(),
            );
            check_timestamps(
                &mut errors,
                "favourites",
                index,
                &[favourite.created_at, favourite.deleted_at],
            );
        }

        if !errors.errors().is_empty() {
            return Err(errors);
        }

        Ok(())
    }
}
