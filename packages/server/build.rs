// Embedded migrations (`sqlx::migrate!`) are compiled into the binary, so
// changes under migrations/ must trigger a rebuild.
fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
