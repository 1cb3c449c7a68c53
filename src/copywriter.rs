use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::gemini::GenerativeModel;
use crate::models::{PhotoCheck, PosterCopy, Tone};
use crate::payload::ImagePayload;

pub const PHOTO_CHECK_INSTRUCTION: &str = "Analyze this image to see if it contains a primary subject suitable for \
a face swap. Ignore people in the background. Is there a clearly visible main face? Answer ONLY 'VALID' if yes. \
If not, give a 5-word reason.";

const DEFAULT_TITLE: &str = "EPIC MOVIE";
const DEFAULT_SLOGAN: &str = "This time, it is personal.";
const DEFAULT_COVER_TEXT: &str = "In a world where everything went wrong, one hero must stand tall.";

/// Style brief for each tone, appended to the copywriting prompt.
pub fn tone_brief(tone: Tone) -> &'static str {
    match tone {
        Tone::Funny => "STYLE: Satirical, absurd, self-deprecating, and 80s parody (like 'The Naked Gun' or 'Airplane!').\n\
            - Movie Title: a ridiculous pun or an overly literal description of the situation.\n\
            - Slogan: a complete non-sequitur or a joke about the hero's incompetence.\n\
            - Cover Text: a mundane, low-stakes situation described as a global catastrophe.\n\
            - EXAMPLE: Title: \"DIE HARDLY\", Slogan: \"He forgot his pants.\", Plot: \"When the office coffee machine breaks, one accountant must type faster than ever before.\"",
        Tone::Action => "STYLE: Gritty 90s blockbuster, high-octane, intense, and overly masculine (like 'Die Hard' or 'Taken').\n\
            - Movie Title: short, punchy, aggressive words (e.g. 'VENGEANCE', 'PROTOCOL', 'IMPACT').\n\
            - Slogan: must start with \"One man...\", \"In a world...\", or \"This time...\".\n\
            - Cover Text: an impossible mission involving terrorists, nuclear devices, or rogue agents.\n\
            - EXAMPLE: Title: \"MAXIMUM FORCE\", Slogan: \"This time, it's personal.\", Plot: \"They stole his daughter's hamster. Now he's burning the city to the ground.\"",
        Tone::Horror => "STYLE: Psychological thriller, ominous, A24 aesthetic, or 80s slasher.\n\
            - Movie Title: abstract single nouns or \"The [Noun]\" (e.g. 'THE SILENCE', 'HEREDITARY').\n\
            - Slogan: a chilling warning or a cryptic message.\n\
            - Cover Text: an ancient curse, isolation, or a past sin coming back to haunt the protagonist. Use words like 'whispers', 'shadows', 'blood'.\n\
            - EXAMPLE: Title: \"THE GUEST\", Slogan: \"Don't let him in.\", Plot: \"The house was supposed to be empty. But the walls have eyes, and they are hungry.\"",
        Tone::Romance => "STYLE: Cheesy Hallmark movie, melodramatic, weeping tragedy, or steamy paperback novel.\n\
            - Movie Title: two words connected by 'Of', 'In', or 'Forever' (e.g. 'WINDS OF PASSION').\n\
            - Slogan: about destiny, forbidden love, or secrets.\n\
            - Cover Text: a misunderstanding between a small-town girl and a big-city executive (or a similar trope).\n\
            - EXAMPLE: Title: \"AUTUMN WHISPERS\", Slogan: \"Love waits for no one.\", Plot: \"She was a baker who loved Christmas. He was a CEO who hated joy. Together, they found the recipe for love.\"",
    }
}

fn credit_names(tone: Tone) -> &'static [&'static str] {
    match tone {
        Tone::Funny => &["Al Dente", "Terry Cloth", "Barb Dwyer", "Justin Case", "Paige Turner", "Rick O'Shea", "Hazel Nutt"],
        Tone::Action => &["Max Power", "Rip Steel", "Jack Danger", "Rock Stone", "Blaze Storm", "Cliff Hanger"],
        Tone::Horror => &["Gore Verbinski", "D. Caying", "Frank N. Stein", "Bones Rattler", "Carrie Coffin"],
        Tone::Romance => &["Val Entine", "Rose Bush", "Lovett Firstsight", "Hart Throb", "Bea Mine"],
    }
}

pub fn copy_prompt(template_title: &str, tone: Tone) -> String {
    format!(
        "Generate creative movie poster text for a \"{tone}\" version of the movie template \"{template_title}\".\n\
         Return JSON with:\n\
         - movieTitle: A {tone} twist on the original title.\n\
         - slogan: A short, punchy, 1-sentence tagline.\n\
         - coverText: A 2-sentence dramatic plot summary (like the text block on a Die Hard poster).\n\
         {brief}",
        tone = tone.label(),
        brief = tone_brief(tone),
    )
}

fn copy_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "movieTitle": { "type": "STRING" },
            "slogan": { "type": "STRING" },
            "coverText": { "type": "STRING" }
        }
    })
}

pub fn fallback_copy() -> PosterCopy {
    PosterCopy {
        movie_title: "EPIC FAIL".into(),
        slogan: "Something went wrong.".into(),
        cover_text: "The AI writer is on strike.".into(),
    }
}

/// Suggests title, slogan and plot blurb. Never fails: missing fields take
/// defaults and any error yields [`fallback_copy`].
pub async fn generate_poster_copy(
    model: &dyn GenerativeModel,
    text_model: &str,
    template_title: &str,
    tone: Tone,
) -> PosterCopy {
    let value = match model.generate_json(text_model, &copy_prompt(template_title, tone), &copy_schema()).await {
        Ok(value) => value,
        Err(e) => {
            error!("❌ Poster copy generation failed: {}", e);
            return fallback_copy();
        }
    };

    let Some(fields) = value.as_object() else {
        warn!("⚠️ Poster copy was not a JSON object: {}", value);
        return fallback_copy();
    };
    let field = |name: &str, default: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    let copy = PosterCopy {
        movie_title: field("movieTitle", DEFAULT_TITLE),
        slogan: field("slogan", DEFAULT_SLOGAN),
        cover_text: field("coverText", DEFAULT_COVER_TEXT),
    };
    info!(tone = tone.label(), "✍️ Poster copy: {}", copy.movie_title);
    copy
}

/// Asks the vision model whether the photo has one clear main face.
pub async fn validate_photo(model: &dyn GenerativeModel, vision_model: &str, photo: &ImagePayload) -> PhotoCheck {
    match model.describe_image(vision_model, photo, PHOTO_CHECK_INSTRUCTION).await {
        Ok(answer) if is_valid_verdict(&answer) => PhotoCheck { valid: true, message: "Great photo!".into() },
        Ok(answer) => PhotoCheck { valid: false, message: answer.trim().to_string() },
        Err(e) => {
            warn!("⚠️ Photo validation skipped: {}", e);
            PhotoCheck { valid: true, message: "Validation skipped".into() }
        }
    }
}

/// The answer opens with VALID, ignoring case and leading quotes or punctuation.
fn is_valid_verdict(answer: &str) -> bool {
    answer
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_uppercase()
        .starts_with("VALID")
}

/// `DIRECTED BY <A>   PRODUCED BY <B>` drawn from the tone's pun names.
///
/// The same tone and seed always give the same line.
pub fn billing_block(tone: Tone, seed: u64) -> String {
    let mut names = credit_names(tone).to_vec();
    names.shuffle(&mut StdRng::seed_from_u64(seed));
    format!(
        "DIRECTED BY {}   PRODUCED BY {}",
        names[0].to_uppercase(),
        names[1].to_uppercase()
    )
}
