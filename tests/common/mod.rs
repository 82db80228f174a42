#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use academy_runtime::certificate::CertificateService;
use academy_runtime::config::Config;
use academy_runtime::enrollment;
use academy_runtime::models::{Course, Lesson, LessonCompletion, Student};
use academy_runtime::store::{LessonStore, MemoryStore, Store};
use academy_runtime::AppState;
use chrono::Utc;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use tempfile::TempDir;
use uuid::Uuid;

/// Characters U+0020..=U+02FF are mapped by the test face, to glyph ids
/// starting at 1, all 600 units wide.
pub const TTF_FIRST: u32 = 0x20;
pub const TTF_LAST: u32 = 0x2FF;

/// Glyph id the test face uses for `c`.
pub fn ttf_glyph(c: char) -> u16 {
    (c as u32 - TTF_FIRST + 1) as u16
}

/// Small face ttf-parser accepts: `cmap` (format 12), `head`, `hhea`,
/// `hmtx` and `maxp`. No outlines, which rendering never reads.
pub fn minimal_ttf() -> Vec<u8> {
    let num_glyphs = (TTF_LAST - TTF_FIRST + 2) as u16;

    let mut cmap = Vec::new();
    cmap.extend_from_slice(&0u16.to_be_bytes()); // version
    cmap.extend_from_slice(&1u16.to_be_bytes()); // numTables
    cmap.extend_from_slice(&3u16.to_be_bytes()); // windows
    cmap.extend_from_slice(&10u16.to_be_bytes()); // full unicode
    cmap.extend_from_slice(&12u32.to_be_bytes());
    cmap.extend_from_slice(&12u16.to_be_bytes()); // format
    cmap.extend_from_slice(&0u16.to_be_bytes());
    cmap.extend_from_slice(&28u32.to_be_bytes()); // length
    cmap.extend_from_slice(&0u32.to_be_bytes()); // language
    cmap.extend_from_slice(&1u32.to_be_bytes()); // numGroups
    cmap.extend_from_slice(&TTF_FIRST.to_be_bytes());
    cmap.extend_from_slice(&TTF_LAST.to_be_bytes());
    cmap.extend_from_slice(&1u32.to_be_bytes()); // startGlyphID

    let mut head = vec![0u8; 54];
    head[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
    head[18..20].copy_from_slice(&1000u16.to_be_bytes()); // unitsPerEm
    head[38..40].copy_from_slice(&(-200i16).to_be_bytes()); // yMin
    head[40..42].copy_from_slice(&1000i16.to_be_bytes()); // xMax
    head[42..44].copy_from_slice(&800i16.to_be_bytes()); // yMax

    let mut hhea = vec![0u8; 36];
    hhea[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    hhea[4..6].copy_from_slice(&800i16.to_be_bytes());
    hhea[6..8].copy_from_slice(&(-200i16).to_be_bytes());
    hhea[34..36].copy_from_slice(&num_glyphs.to_be_bytes());

    let mut hmtx = Vec::with_capacity(usize::from(num_glyphs) * 4);
    for _ in 0..num_glyphs {
        hmtx.extend_from_slice(&600u16.to_be_bytes());
        hmtx.extend_from_slice(&0i16.to_be_bytes());
    }

    let mut maxp = vec![0u8; 6];
    maxp[0..4].copy_from_slice(&0x0000_5000u32.to_be_bytes());
    maxp[4..6].copy_from_slice(&num_glyphs.to_be_bytes());

    // records must be sorted by tag
    let tables: [(&[u8; 4], Vec<u8>); 5] = [
        (b"cmap", cmap),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"maxp", maxp),
    ];

    let mut out = Vec::new();
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&(tables.len() as u16).to_be_bytes());
    out.extend_from_slice(&64u16.to_be_bytes()); // searchRange
    out.extend_from_slice(&2u16.to_be_bytes()); // entrySelector
    out.extend_from_slice(&16u16.to_be_bytes()); // rangeShift

    let mut offset = 12 + 16 * tables.len();
    let mut body = Vec::new();
    for (tag, data) in &tables {
        out.extend_from_slice(*tag);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        offset = 12 + 16 * tables.len() + body.len();
    }
    out.extend_from_slice(&body);
    out
}

/// A landscape template with `pages` pages, each carrying a stroked frame.
pub fn template_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for _ in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new(
                    "re",
                    vec![
                        Object::Integer(20),
                        Object::Integer(20),
                        Object::Integer(802),
                        Object::Integer(555),
                    ],
                ),
                Operation::new("S", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("encode template content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(842),
                Object::Integer(595),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save template");
    out
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create dirs");
    fs::write(path, bytes).expect("write file");
}

pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub student: Student,
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

impl Fixture {
    /// Memory-backed state with assets in place and a student enrolled in a
    /// free four-lesson course.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let vars: HashMap<&str, String> = HashMap::from([
            ("STORAGE", "memory".to_string()),
            ("MEDIA_ROOT", dir.path().join("media").display().to_string()),
            ("STATIC_DIR", dir.path().join("static").display().to_string()),
            ("MEDIA_URL", "/media".to_string()),
            ("CERT_NUMBER_PREFIX", "ACAD".to_string()),
        ]);
        let config = Config::from_lookup(|k| vars.get(k).cloned()).expect("config");
        write_file(&config.assets.template, &template_pdf(1));
        write_file(&config.assets.font, &minimal_ttf());

        let store = Arc::new(MemoryStore::new());
        let student = store
            .add_student("Ada", Some("King"), "Lovelace", "ada@example.com")
            .await;
        let category = store.add_category("Foundations", true).await;
        let course = store.add_course(&category, "Analytical Engines", 0).await;
        let mut lessons = Vec::new();
        for i in 1..=4 {
            lessons.push(store.add_lesson(course.id, &format!("Lesson {i}"), i).await);
        }

        let state = AppState::new(store.clone() as Arc<dyn Store>, &config);
        enrollment::enroll_free(state.store.as_ref(), student.id, course.id)
            .await
            .expect("enroll");

        Self {
            dir,
            config,
            store,
            state,
            student,
            course,
            lessons,
        }
    }

    pub fn certificates(&self) -> Arc<CertificateService> {
        self.state.certificates.clone()
    }

    /// Write a completion row the way the lesson endpoint does.
    pub async fn record(&self, lesson: &Lesson) -> bool {
        self.store
            .record_completion(&LessonCompletion {
                id: Uuid::new_v4(),
                student_id: self.student.id,
                course_id: self.course.id,
                lesson_id: lesson.id,
                completion_date: Utc::now(),
            })
            .await
            .expect("record completion")
    }

    pub async fn complete_all(&self) {
        for lesson in &self.lessons {
            self.record(lesson).await;
        }
    }

    pub fn certificate_dir(&self) -> std::path::PathBuf {
        self.config.media_root.join("certificate")
    }

    pub fn rendered_files(&self) -> Vec<std::path::PathBuf> {
        match fs::read_dir(self.certificate_dir()) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}
