//! Submitted forms and their validation rules.
//!
//! Forms decode from `application/x-www-form-urlencoded` bodies via
//! [`Request::form`](crate::Request::form) and are handed back to the
//! renderer when validation fails. Password fields are never serialized.

use serde::{Deserialize, Serialize};

use crate::validator::{self, Validator, EMAIL_RX};

const BLANK: &str = "This field cannot be blank";
const BAD_EMAIL: &str = "This field must be a valid email address";
const TOO_SHORT: &str = "This field must be at least 8 characters long";

/// Snippet lifetimes offered by the create form, in days.
pub const EXPIRY_CHOICES: [i64; 3] = [1, 7, 365];

/// Minimum password length in characters.
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Missing fields decode as empty or zero, so a submission without
/// `expires` fails validation instead of picking up the GET default.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SnippetCreateForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub expires: i64,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl Default for SnippetCreateForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            expires: 365,
            validator: Validator::default(),
        }
    }
}

impl SnippetCreateForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(validator::not_blank(&self.title), "title", BLANK);
        v.check_field(
            validator::max_chars(&self.title, 100),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(validator::not_blank(&self.content), "content", BLANK);
        v.check_field(
            validator::permitted_value(self.expires, &EXPIRY_CHOICES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v.is_valid()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl SignupForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(validator::not_blank(&self.name), "name", BLANK);
        v.check_field(validator::not_blank(&self.email), "email", BLANK);
        v.check_field(validator::matches(&self.email, &EMAIL_RX), "email", BAD_EMAIL);
        v.check_field(validator::not_blank(&self.password), "password", BLANK);
        v.check_field(validator::min_chars(&self.password, MIN_PASSWORD_CHARS), "password", TOO_SHORT);
        v.is_valid()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl LoginForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(validator::not_blank(&self.email), "email", BLANK);
        v.check_field(validator::matches(&self.email, &EMAIL_RX), "email", BAD_EMAIL);
        v.check_field(validator::not_blank(&self.password), "password", BLANK);
        v.is_valid()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordUpdateForm {
    #[serde(skip_serializing)]
    pub current_password: String,
    #[serde(skip_serializing)]
    pub new_password: String,
    #[serde(skip_serializing)]
    pub confirm_password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl PasswordUpdateForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(validator::not_blank(&self.current_password), "current_password", BLANK);
        v.check_field(validator::not_blank(&self.new_password), "new_password", BLANK);
        v.check_field(
            validator::min_chars(&self.new_password, MIN_PASSWORD_CHARS),
            "new_password",
            TOO_SHORT,
        );
        v.check_field(validator::not_blank(&self.confirm_password), "confirm_password", BLANK);
        v.check_field(
            self.new_password == self.confirm_password,
            "confirm_password",
            "Passwords do not match",
        );
        v.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode<T: serde::de::DeserializeOwned>(body: &str) -> T {
        serde_urlencoded::from_str(body).expect("decodes")
    }

    #[test]
    fn create_form_accepts_the_boundary_title() {
        let mut form: SnippetCreateForm =
            decode(&format!("title={}&content=body&expires=7&csrf_token=x", "a".repeat(100)));
        assert!(form.validate());

        let mut form: SnippetCreateForm = decode(&format!("title={}&content=body&expires=7", "a".repeat(101)));
        assert!(!form.validate());
        assert_eq!(
            form.validator.field_error("title"),
            Some("This field cannot be more than 100 characters long"),
        );
    }

    #[test]
    fn create_form_rejects_unlisted_expiry() {
        let mut form: SnippetCreateForm = decode("title=t&content=c&expires=5");
        assert!(!form.validate());
        assert_eq!(form.validator.field_error("expires"), Some("This field must equal 1, 7 or 365"));
    }

    #[test]
    fn create_form_defaults_to_a_year_only_when_blank() {
        assert_eq!(SnippetCreateForm::default().expires, 365);
        let mut submitted: SnippetCreateForm = decode("title=t&content=c");
        assert_eq!(submitted.expires, 0);
        assert!(!submitted.validate());
    }

    #[test]
    fn short_signup_password_is_rejected() {
        let mut form: SignupForm = decode("name=Bob&email=bob%40example.com&password=pa%24%24");
        assert!(!form.validate());
        assert_eq!(form.validator.field_error("password"), Some(TOO_SHORT));
        assert_eq!(form.validator.field_errors().len(), 1);
    }

    #[test]
    fn blank_login_reports_blank_before_format() {
        let mut form: LoginForm = decode("email=&password=");
        assert!(!form.validate());
        assert_eq!(form.validator.field_error("email"), Some(BLANK));
        assert_eq!(form.validator.field_error("password"), Some(BLANK));
    }

    #[test]
    fn mismatched_confirmation_is_a_field_error() {
        let mut form: PasswordUpdateForm =
            decode("current_password=pa%24%24word&new_password=longenough&confirm_password=different1");
        assert!(!form.validate());
        assert_eq!(form.validator.field_error("confirm_password"), Some("Passwords do not match"));
    }

    #[test]
    fn passwords_are_never_echoed() {
        let form: SignupForm = decode("name=Bob&email=bob%40example.com&password=hunter22hunter22");
        let json = serde_json::to_string(&form).expect("serialize");
        assert!(!json.contains("hunter22"));
        assert!(json.contains("bob@example.com"));
    }

    #[test]
    fn non_numeric_expiry_fails_to_decode() {
        assert!(serde_urlencoded::from_str::<SnippetCreateForm>("title=t&expires=soon").is_err());
    }
}
