//! テスト用の合成フレーム

use crate::pose::{Frame, Keypoint, Landmark};

fn kp(x: f32, y: f32) -> Keypoint {
    Keypoint::new(x, y, 1.0)
}

/// 両肘が指定角度になるフレーム
pub fn elbows(deg: f32) -> Frame {
    let (s, c) = deg.to_radians().sin_cos();
    let mut frame = Frame::new();
    for (shoulder, elbow, wrist, x0) in [
        (Landmark::LeftShoulder, Landmark::LeftElbow, Landmark::LeftWrist, 200.0),
        (Landmark::RightShoulder, Landmark::RightElbow, Landmark::RightWrist, 400.0),
    ] {
        frame.set(shoulder, Some(kp(x0, 50.0)));
        frame.set(elbow, Some(kp(x0, 150.0)));
        frame.set(wrist, Some(kp(x0 + 100.0 * s, 150.0 - 100.0 * c)));
    }
    frame
}

/// 左半身のみ。着座（膝・股関節とも90度）または起立（180度）
pub fn sit_stand(standing: bool) -> Frame {
    let (knee, ankle) = if standing {
        ((100.0, 200.0), (100.0, 300.0))
    } else {
        ((200.0, 100.0), (200.0, 200.0))
    };
    Frame::new()
        .with(Landmark::LeftShoulder, kp(100.0, 0.0))
        .with(Landmark::LeftHip, kp(100.0, 100.0))
        .with(Landmark::LeftKnee, kp(knee.0, knee.1))
        .with(Landmark::LeftAnkle, kp(ankle.0, ankle.1))
}

/// 直立（肩幅40px, 体幹長100px, 腰y=200）。`dx` で水平移動
pub fn standing(dx: f32) -> Frame {
    Frame::new()
        .with(Landmark::Nose, kp(320.0 + dx, 60.0))
        .with(Landmark::LeftShoulder, kp(300.0 + dx, 100.0))
        .with(Landmark::RightShoulder, kp(340.0 + dx, 100.0))
        .with(Landmark::LeftHip, kp(305.0 + dx, 200.0))
        .with(Landmark::RightHip, kp(335.0 + dx, 200.0))
        .with(Landmark::LeftWrist, kp(295.0 + dx, 220.0))
        .with(Landmark::RightWrist, kp(345.0 + dx, 220.0))
}

/// 直立で右手首を頭上の `x` に上げたフレーム
pub fn waving(x: f32) -> Frame {
    standing(0.0).with(Landmark::RightWrist, kp(x, 50.0))
}

/// 床の上で横臥（体幹はほぼ水平, 腰y=300）
pub fn lying() -> Frame {
    Frame::new()
        .with(Landmark::LeftShoulder, kp(200.0, 290.0))
        .with(Landmark::RightShoulder, kp(200.0, 310.0))
        .with(Landmark::LeftHip, kp(300.0, 292.0))
        .with(Landmark::RightHip, kp(300.0, 308.0))
        .with(Landmark::LeftWrist, kp(250.0, 320.0))
        .with(Landmark::RightWrist, kp(250.0, 330.0))
}
