//! Naming conventions for collections and relation keys

/// `ChatMessage` -> `chat_message`
pub fn snake_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;

    for c in name.chars() {
        if c.is_uppercase() {
            if previous_lower {
                result.push('_');
            }
            result.extend(c.to_lowercase());
            previous_lower = false;
        } else {
            result.push(c);
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }

    result
}

/// Simple pluralization (English-centric)
pub fn pluralize(name: &str) -> String {
    let vowel_y = ["ay", "ey", "iy", "oy", "uy"];
    if name.ends_with('y') && !vowel_y.iter().any(|suffix| name.ends_with(suffix)) {
        format!("{}ies", &name[..name.len() - 1])
    } else if name.ends_with('s')
        || name.ends_with("sh")
        || name.ends_with("ch")
        || name.ends_with('x')
        || name.ends_with('z')
    {
        format!("{}es", name)
    } else {
        format!("{}s", name)
    }
}

/// Default collection for a model: `ChatMessage` -> `chat_messages`
pub fn collection_name(model: &str) -> String {
    pluralize(&snake_case(model))
}

/// Default foreign key pointing at a model: `User` -> `user_id`
pub fn foreign_key_for(model: &str) -> String {
    format!("{}_id", snake_case(model))
}

/// Default identity list key for embedded references: `Tag` -> `tag_ids`
pub fn id_list_key_for(model: &str) -> String {
    format!("{}_ids", snake_case(model))
}

/// Default polymorphic name for a model: `Comment` -> `commentable`
pub fn morph_name_for(model: &str) -> String {
    format!("{}able", snake_case(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("User"), "user");
        assert_eq!(snake_case("ChatMessage"), "chat_message");
        assert_eq!(snake_case("OAuth2Token"), "oauth2_token");
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(collection_name("User"), "users");
        assert_eq!(collection_name("Category"), "categories");
        assert_eq!(collection_name("Day"), "days");
        assert_eq!(collection_name("Box"), "boxes");
        assert_eq!(collection_name("ChatMessage"), "chat_messages");
    }

    #[test]
    fn test_key_names() {
        assert_eq!(foreign_key_for("Chat"), "chat_id");
        assert_eq!(id_list_key_for("Tag"), "tag_ids");
        assert_eq!(morph_name_for("Message"), "messageable");
    }
}
