//! 显示窗口中的文字提示

use opencv::{
    core::{Mat, Point, Scalar},
    imgproc::{self, FONT_HERSHEY_COMPLEX, FONT_HERSHEY_SIMPLEX, LINE_8},
};

const HINT_SCALE: f64 = 0.6;
const HINT_THICKNESS: i32 = 2;
const RESULT_POS: (i32, i32) = (220, 240);
const RESULT_SCALE: f64 = 2.0;
const RESULT_THICKNESS: i32 = 2;

fn hint_color() -> Scalar {
    Scalar::new(255.0, 200.0, 0.0, 0.0)
}

fn result_color() -> Scalar {
    Scalar::new(0.0, 0.0, 255.0, 0.0)
}

fn put_text(
    img: &mut Mat,
    text: &str,
    org: (i32, i32),
    font: i32,
    scale: f64,
    color: Scalar,
    thickness: i32,
) -> opencv::Result<()> {
    imgproc::put_text(
        img,
        text,
        Point::new(org.0, org.1),
        font,
        scale,
        color,
        thickness,
        LINE_8,
        false,
    )
}

/// 采集阶段的操作提示和设备名
pub fn draw_instructions(img: &mut Mat, device: &str) -> opencv::Result<()> {
    let lines = [
        ("press c to calibrate".to_string(), (20, 70)),
        ("press q to quit".to_string(), (20, 110)),
        (format!("device: {}", device), (20, 30)),
    ];
    for (text, org) in lines.iter() {
        put_text(
            img,
            text,
            *org,
            FONT_HERSHEY_SIMPLEX,
            HINT_SCALE,
            hint_color(),
            HINT_THICKNESS,
        )?;
    }
    Ok(())
}

/// 标定结果 "Success!" / "Failed!"
pub fn draw_result(img: &mut Mat, success: bool) -> opencv::Result<()> {
    let text = if success { "Success!" } else { "Failed!" };
    put_text(
        img,
        text,
        RESULT_POS,
        FONT_HERSHEY_COMPLEX,
        RESULT_SCALE,
        result_color(),
        RESULT_THICKNESS,
    )
}
