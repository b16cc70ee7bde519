/// Prompt for extracting the offers of one flyer.
///
/// Loaded from `prompts/flyer.txt` at compile time. Contains `{{STORE}}`
/// placeholders replaced by `build_flyer_prompt`.
pub const FLYER_PROMPT: &str = include_str!("prompts/flyer.txt");

/// Prompt for inventing new recipes, loaded from `prompts/recipes.txt`
pub const RECIPE_PROMPT: &str = include_str!("prompts/recipes.txt");

pub fn build_flyer_prompt(store_name: &str) -> String {
    FLYER_PROMPT.replace("{{STORE}}", store_name)
}

/// Build the recipe prompt, suggesting `ingredients` when there are any
pub fn build_recipe_prompt(
    categories: &[String],
    meal_slots: &[String],
    recipes_per_category: u32,
    ingredients: &[String],
) -> String {
    let ingredients_line = if ingredients.is_empty() {
        String::new()
    } else {
        format!(
            "Try to use some of these ingredients on sale this week: {}.",
            ingredients.join(", ")
        )
    };

    RECIPE_PROMPT
        .replace("{{COUNT}}", &recipes_per_category.to_string())
        .replace("{{INGREDIENTS}}", &ingredients_line)
        .replace("{{CATEGORIES}}", &categories.join(", "))
        .replace("{{MEAL_SLOTS}}", &meal_slots.join(", "))
}
